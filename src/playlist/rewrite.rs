// src/playlist/rewrite.rs
// =============================================================================
// Rewrites a playlist so its references point at the local mirror.
//
// Line by line:
// - bare reference lines become the relative path to the mirrored file
// - URI="..." values on reference-bearing tags become relative paths
// - everything else is copied through byte for byte, line endings included
//
// A reference with no local path (filtered out of the crawl, or not a URL the
// mapper understands) keeps its original text. That only costs offline
// playability for that one line, so it is logged and not treated as an error.
//
// Works on bytes end to end: a line the rewriter does not touch is written
// back exactly as it was read, whatever its encoding.
// =============================================================================

use tracing::debug;
use url::Url;

use super::resolve::resolve;
use super::tags::{reference_text, scan_line, split_line_ending, Line};
use crate::error::PathError;
use crate::storage::PathMapper;

/// Rewrites `body` against the paths already assigned in `paths`.
///
/// `base` is the URL references are resolved against, and `source_url` is
/// the key the playlist itself was assigned under. Never assigns new paths.
pub fn rewrite(body: &[u8], base: &Url, source_url: &str, paths: &PathMapper) -> Vec<u8> {
    let mut output = Vec::with_capacity(body.len());

    for chunk in body.split_inclusive(|&b| b == b'\n') {
        let (line, ending) = split_line_ending(chunk);

        let rewritten = match scan_line(line) {
            Line::Blank | Line::Comment => None,
            Line::Reference(span) => local_reference(base, source_url, &line[span], paths)
                .map(String::into_bytes)
                .map_err(log_skip)
                .ok(),
            Line::Tag { uris } => rewrite_tag(line, &uris, base, source_url, paths)
                .map_err(log_skip)
                .ok(),
        };

        match rewritten {
            Some(line) => {
                output.extend_from_slice(&line);
                output.extend_from_slice(ending);
            }
            None => output.extend_from_slice(chunk),
        }
    }

    output
}

/// Relative local path for one reference, given as the raw bytes written in
/// the playlist.
fn local_reference(
    base: &Url,
    source_url: &str,
    reference: &[u8],
    paths: &PathMapper,
) -> Result<String, PathError> {
    let absolute = resolve(base, &reference_text(reference));
    paths.relative_path(source_url, &absolute)
}

/// Replaces every URI value in a tag line. Any value that cannot be mapped
/// fails the whole line, leaving it as written.
fn rewrite_tag(
    line: &[u8],
    uris: &[std::ops::Range<usize>],
    base: &Url,
    source_url: &str,
    paths: &PathMapper,
) -> Result<Vec<u8>, PathError> {
    let mut result = Vec::with_capacity(line.len());
    let mut copied = 0;

    for span in uris {
        let local = local_reference(base, source_url, &line[span.clone()], paths)?;
        result.extend_from_slice(&line[copied..span.start]);
        result.extend_from_slice(local.as_bytes());
        copied = span.end;
    }
    result.extend_from_slice(&line[copied..]);

    Ok(result)
}

fn log_skip(err: PathError) {
    debug!(error = %err, "leaving reference unrewritten");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Layout;

    const SOURCE: &str = "https://example.com/path/playlist.m3u8";

    fn rewrite_str(body: &str, source_url: &str, paths: &PathMapper) -> String {
        let base = Url::parse(source_url).unwrap();
        String::from_utf8(rewrite(body.as_bytes(), &base, source_url, paths)).unwrap()
    }

    fn mapper(urls: &[&str]) -> PathMapper {
        let paths = PathMapper::new("/out", Layout::Hierarchical);
        for url in urls {
            paths.assign(url).unwrap();
        }
        paths
    }

    #[test]
    fn test_rewrites_segments_and_key() {
        let paths = mapper(&[
            SOURCE,
            "https://example.com/path/enc.key",
            "https://example.com/path/seg1.ts",
            "https://cdn.example.com/other/seg2.ts",
        ]);
        let body = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"enc.key\",IV=0x01\n#EXTINF:4,\nseg1.ts\n\n#EXTINF:4,\nhttps://cdn.example.com/other/seg2.ts\n";

        let out = rewrite_str(body, SOURCE, &paths);

        assert_eq!(
            out,
            "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"enc.key\",IV=0x01\n#EXTINF:4,\nseg1.ts\n\n#EXTINF:4,\n../other/seg2.ts\n"
        );
    }

    #[test]
    fn test_absolute_urls_become_relative() {
        let paths = mapper(&[SOURCE, "https://example.com/path/low/index.m3u8"]);
        let body = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nhttps://example.com/path/low/index.m3u8\n";

        let out = rewrite_str(body, SOURCE, &paths);

        assert_eq!(out, "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nlow/index.m3u8\n");
    }

    #[test]
    fn test_unmapped_reference_keeps_original_text() {
        let paths = mapper(&[SOURCE, "https://example.com/path/seg.ts"]);
        let body = "#EXT-X-MEDIA:TYPE=SUBTITLES,URI=\"https://example.com/subs/en.vtt\"\nhttps://example.com/path/seg.ts\nskipped.vtt\n";

        let out = rewrite_str(body, SOURCE, &paths);

        assert_eq!(
            out,
            "#EXT-X-MEDIA:TYPE=SUBTITLES,URI=\"https://example.com/subs/en.vtt\"\nseg.ts\nskipped.vtt\n"
        );
        // Rewriting must not sneak in assignments for skipped URLs
        assert!(paths.lookup("https://example.com/path/skipped.vtt").is_none());
    }

    #[test]
    fn test_tag_with_multiple_uris() {
        let paths = mapper(&[
            SOURCE,
            "https://example.com/path/a.key",
            "https://example.com/keys/b.key",
        ]);
        let body = "#EXT-X-KEY:URI=\"a.key\",X-URI=\"/keys/b.key\"";

        let out = rewrite_str(body, SOURCE, &paths);

        assert_eq!(out, "#EXT-X-KEY:URI=\"a.key\",X-URI=\"../keys/b.key\"");
    }

    #[test]
    fn test_line_endings_and_whitespace_preserved() {
        let paths = mapper(&[SOURCE, "https://example.com/path/seg.ts"]);
        let body = "#EXTM3U\r\n  \r\n#EXTINF:4,\r\n  seg.ts  \r\n#EXT-X-ENDLIST";

        let out = rewrite_str(body, SOURCE, &paths);

        assert_eq!(out, "#EXTM3U\r\n  \r\n#EXTINF:4,\r\nseg.ts\r\n#EXT-X-ENDLIST");
    }

    #[test]
    fn test_flattened_layout_rewrites_to_basenames() {
        let paths = PathMapper::new("/out", Layout::Flattened);
        paths.assign("https://example.com/master.m3u8").unwrap();
        paths.assign("https://example.com/low/index.m3u8").unwrap();
        let body = "#EXTM3U\nlow/index.m3u8\n";

        let out = rewrite_str(body, "https://example.com/master.m3u8", &paths);

        assert_eq!(out, "#EXTM3U\nindex.m3u8\n");
    }

    #[test]
    fn test_non_utf8_lines_pass_through_untouched() {
        let paths = mapper(&[SOURCE, "https://example.com/path/seg.ts"]);
        let base = Url::parse(SOURCE).unwrap();
        let body = b"#EXTM3U\n#EXTINF:-1,Caf\xe9 TV\nhttps://example.com/path/seg.ts\n";

        let out = rewrite(body, &base, SOURCE, &paths);

        assert_eq!(out, b"#EXTM3U\n#EXTINF:-1,Caf\xe9 TV\nseg.ts\n".to_vec());
    }

    #[test]
    fn test_non_utf8_reference_maps_like_the_parser() {
        let paths = mapper(&[SOURCE, "https://example.com/path/Caf%E9.ts"]);
        let base = Url::parse(SOURCE).unwrap();

        let out = rewrite(b"Caf\xe9.ts\n", &base, SOURCE, &paths);

        // %E9 alone is not UTF-8, so the file name keeps the escape
        assert_eq!(out, b"Caf%E9.ts\n".to_vec());
    }
}
