// src/playlist/tags.rs
// =============================================================================
// The line tokenizer shared by the parser and the rewriter.
//
// An HLS playlist is line oriented. Every line is one of:
// - blank
// - a comment or tag that carries no reference (#EXTINF, #EXT-X-VERSION, ...)
// - a reference-bearing tag whose URI="..." attributes point at resources
// - a bare reference (segment or nested playlist URL)
//
// Which tags carry references is decided by REFERENCE_TAGS below and nowhere
// else. The parser and the rewriter both call scan_line(), so they always
// agree on where the references are.
//
// Lines are scanned as bytes, not text. Everything the scanner looks for
// ('#', tag names, URI=", .m3u8) is ASCII, so a Latin-1 title in an #EXTINF
// comment never stops a playlist from being read. Only the reference spans
// themselves are turned into strings, by reference_text().
//
// Rust concepts:
// - Range<usize>: byte spans into the raw line, so no copies are made
// - Cow<str>: borrowed when the span is already UTF-8, owned when it needed fixing
// =============================================================================

use std::borrow::Cow;
use std::ops::Range;

/// One entry of the tag table.
#[derive(Debug, Clone, Copy)]
pub struct TagRule {
    /// Substring that identifies the tag on a `#` line
    pub name: &'static str,
    /// Whether URI="..." attributes on this tag are references
    pub extracts_uri: bool,
}

/// Tags whose URI attributes are references.
pub const REFERENCE_TAGS: &[TagRule] = &[
    TagRule { name: "EXT-X-KEY", extracts_uri: true },
    TagRule { name: "EXT-X-MEDIA", extracts_uri: true },
    TagRule { name: "EXT-X-MAP", extracts_uri: true },
    TagRule { name: "EXT-X-I-FRAME-STREAM-INF", extracts_uri: true },
];

/// File suffix of nested playlists.
pub const PLAYLIST_SUFFIX: &str = ".m3u8";

const URI_ATTRIBUTE: &[u8] = b"URI=\"";

/// Classification of a single playlist line. Every range is a byte span
/// inside the raw line it was scanned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank,
    /// A `#` line that carries no references
    Comment,
    /// A reference-bearing tag. Each range is one quoted URI value,
    /// quotes excluded.
    Tag { uris: Vec<Range<usize>> },
    /// A bare reference, surrounding whitespace excluded
    Reference(Range<usize>),
}

/// Classifies one line (without its line terminator).
pub fn scan_line(raw: &[u8]) -> Line {
    let span = trimmed_span(raw);
    let trimmed = &raw[span.clone()];

    if trimmed.is_empty() {
        return Line::Blank;
    }

    if trimmed[0] != b'#' {
        return Line::Reference(span);
    }

    let carries_uri = REFERENCE_TAGS
        .iter()
        .any(|rule| rule.extracts_uri && find(trimmed, rule.name.as_bytes()).is_some());

    if carries_uri {
        Line::Tag { uris: uri_spans(raw) }
    } else {
        Line::Comment
    }
}

/// Turns a reference span into text.
///
/// Valid UTF-8 is borrowed as is. Any byte that is not part of a valid UTF-8
/// sequence is percent-encoded ("Caf\xe9.ts" -> "Caf%E9.ts"), which is how it
/// would travel in a request line anyway. The parser and the rewriter both go
/// through here, so they produce the same URL for the same bytes.
pub fn reference_text(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(encode_invalid_utf8(raw)),
    }
}

fn encode_invalid_utf8(mut raw: &[u8]) -> String {
    let mut text = String::with_capacity(raw.len() + 8);

    while !raw.is_empty() {
        match std::str::from_utf8(raw) {
            Ok(valid) => {
                text.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, rest) = raw.split_at(e.valid_up_to());
                // The prefix was just checked by from_utf8
                text.push_str(std::str::from_utf8(valid).unwrap_or_default());

                // error_len() is None only for a sequence cut off at the end
                let bad = e.error_len().unwrap_or(rest.len());
                text.push_str(&urlencoding::encode_binary(&rest[..bad]));
                raw = &rest[bad..];
            }
        }
    }

    text
}

/// Span of `raw` with ASCII whitespace removed from both ends.
fn trimmed_span(raw: &[u8]) -> Range<usize> {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(raw.len());
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |last| last + 1);
    start..end
}

/// Byte offset of the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Finds every URI="..." value in a line, in order of appearance.
/// An attribute with no closing quote ends the scan.
fn uri_spans(line: &[u8]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut pos = 0;

    while let Some(found) = find(&line[pos..], URI_ATTRIBUTE) {
        let start = pos + found + URI_ATTRIBUTE.len();
        let Some(len) = line[start..].iter().position(|&b| b == b'"') else {
            break;
        };
        spans.push(start..start + len);
        pos = start + len + 1;
    }

    spans
}

/// True when a reference (as written, before resolution) names a playlist.
pub fn is_playlist_reference(reference: &str) -> bool {
    reference.ends_with(PLAYLIST_SUFFIX) || reference.contains(".m3u8?")
}

/// Splits a line chunk from `<[u8]>::split_inclusive` into its content and
/// its terminator ("\n", "\r\n" or "" for a final unterminated line).
pub fn split_line_ending(chunk: &[u8]) -> (&[u8], &[u8]) {
    let ending = if chunk.ends_with(b"\r\n") {
        2
    } else if chunk.ends_with(b"\n") {
        1
    } else {
        0
    };
    chunk.split_at(chunk.len() - ending)
}
