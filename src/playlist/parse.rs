// src/playlist/parse.rs
// =============================================================================
// Turns raw playlist bytes into a Playlist: the bytes themselves, the URL
// they came from, and every reference in the order it appears.
//
// Handles both master playlists (which list variant playlists) and media
// playlists (which list segments, keys, init sections, subtitles).
//
// Every reference is resolved to an absolute URL before it is stored.
//
// The body is split on '\n' and each line is scanned as bytes, so text in
// any encoding is accepted. The one thing that is refused is a line longer
// than MAX_LINE_LEN: no real playlist has one, and it usually means the
// server sent something that is not a playlist at all.
// =============================================================================

use bytes::Bytes;
use url::Url;

use super::resolve::resolve;
use super::tags::{is_playlist_reference, reference_text, scan_line, Line};
use crate::error::MirrorError;

/// Longest line the scanner accepts, terminator excluded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// One reference found in a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Absolute URL of the referenced resource
    pub url: String,
    /// Whether the reference is itself a playlist to recurse into
    pub is_playlist: bool,
}

/// A parsed playlist document. Immutable once built.
#[derive(Debug, Clone)]
pub struct Playlist {
    pub body: Bytes,
    pub base: Url,
    pub references: Vec<Reference>,
}

impl Playlist {
    /// Parses `body`, fetched from `base`.
    ///
    /// The grammar never rejects a line. The only failure is a line too long
    /// to scan (see MAX_LINE_LEN).
    pub fn parse(body: Bytes, base: Url) -> Result<Self, MirrorError> {
        let mut references = Vec::new();

        for (index, line) in body.split(|&b| b == b'\n').enumerate() {
            if line.len() > MAX_LINE_LEN {
                return Err(MirrorError::Parse {
                    url: base.to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("line {} is longer than {} bytes", index + 1, MAX_LINE_LEN),
                    ),
                });
            }

            match scan_line(line) {
                Line::Blank | Line::Comment => {}
                Line::Tag { uris } => {
                    // Keys, init sections and renditions are plain resources
                    for span in uris {
                        references.push(Reference {
                            url: resolve(&base, &reference_text(&line[span])),
                            is_playlist: false,
                        });
                    }
                }
                Line::Reference(span) => {
                    let reference = reference_text(&line[span]);
                    references.push(Reference {
                        url: resolve(&base, &reference),
                        is_playlist: is_playlist_reference(&reference),
                    });
                }
            }
        }

        Ok(Playlist {
            body,
            base,
            references,
        })
    }

    /// True if any reference points at another playlist.
    pub fn is_master(&self) -> bool {
        self.references.iter().any(|r| r.is_playlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &'static str, base: &str) -> Playlist {
        Playlist::parse(Bytes::from_static(text.as_bytes()), Url::parse(base).unwrap()).unwrap()
    }

    #[test]
    fn test_media_playlist_segments() {
        let playlist = parse(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.9,\nsegment1.ts\n#EXTINF:9.9,\nsegment2.ts\n#EXT-X-ENDLIST\n",
            "https://example.com/playlist.m3u8",
        );

        let urls: Vec<&str> = playlist.references.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/segment1.ts",
                "https://example.com/segment2.ts"
            ]
        );
        assert!(!playlist.is_master());
    }

    #[test]
    fn test_key_tag_and_segment() {
        let playlist = parse(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-KEY:METHOD=AES-128,URI=\"encryption.key\"\n#EXTINF:10.0,\nsegment.ts\n",
            "https://example.com/path/playlist.m3u8",
        );

        assert_eq!(playlist.references.len(), 2);
        assert_eq!(
            playlist.references[0],
            Reference {
                url: "https://example.com/path/encryption.key".to_string(),
                is_playlist: false,
            }
        );
        assert_eq!(playlist.references[1].url, "https://example.com/path/segment.ts");
    }

    #[test]
    fn test_master_playlist_marks_variants() {
        let playlist = parse(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=2560000\nhigh/index.m3u8?token=abc\n",
            "https://example.com/master.m3u8",
        );

        assert_eq!(playlist.references.len(), 2);
        assert!(playlist.references.iter().all(|r| r.is_playlist));
        assert!(playlist.is_master());
        assert_eq!(
            playlist.references[1].url,
            "https://example.com/high/index.m3u8?token=abc"
        );
    }

    #[test]
    fn test_tag_references_are_never_playlists() {
        let playlist = parse(
            "#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",URI=\"audio/index.m3u8\"\n#EXT-X-MAP:URI=\"init.mp4\"\n",
            "https://example.com/master.m3u8",
        );

        assert_eq!(playlist.references.len(), 2);
        assert!(playlist.references.iter().all(|r| !r.is_playlist));
    }

    #[test]
    fn test_order_follows_source_text() {
        let playlist = parse(
            "#EXT-X-MAP:URI=\"init.mp4\"\nb.ts\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.key\"\na.ts\n",
            "https://example.com/v/p.m3u8",
        );
        let urls: Vec<&str> = playlist.references.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.com/v/init.mp4",
                "https://example.com/v/b.ts",
                "https://example.com/v/k.key",
                "https://example.com/v/a.ts",
            ]
        );
    }

    #[test]
    fn test_latin1_title_is_accepted() {
        let body = Bytes::from_static(b"#EXTM3U\n#EXTINF:-1,Caf\xe9 TV\nseg.ts\n");
        let base = Url::parse("https://example.com/live/p.m3u8").unwrap();
        let playlist = Playlist::parse(body, base).unwrap();

        assert_eq!(playlist.references.len(), 1);
        assert_eq!(playlist.references[0].url, "https://example.com/live/seg.ts");
    }

    #[test]
    fn test_invalid_utf8_reference_is_percent_encoded() {
        let body = Bytes::from_static(b"#EXTM3U\nCaf\xe9.ts\r\n");
        let base = Url::parse("https://example.com/live/p.m3u8").unwrap();
        let playlist = Playlist::parse(body, base).unwrap();

        assert_eq!(playlist.references[0].url, "https://example.com/live/Caf%E9.ts");
    }

    #[test]
    fn test_overlong_line_is_a_parse_error() {
        let mut text = b"#EXTM3U\n".to_vec();
        text.extend(std::iter::repeat(b'a').take(MAX_LINE_LEN + 1));
        let base = Url::parse("https://example.com/p.m3u8").unwrap();

        let err = Playlist::parse(Bytes::from(text), base).unwrap_err();
        assert!(matches!(err, MirrorError::Parse { .. }));
        assert_eq!(err.url(), "https://example.com/p.m3u8");
        assert!(err.to_string().contains("line 2"));
    }
}
