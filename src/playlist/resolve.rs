// src/playlist/resolve.rs
// =============================================================================
// Resolves references found in a playlist against the playlist's own URL.
//
// Reference shapes:
// - absolute URL ("https://cdn.example.com/a.ts") -> returned unchanged
// - absolute path ("/live/a.ts")                  -> base scheme + host + path
// - relative path ("a.ts", "../a.ts")             -> joined to base's directory
//
// A reference the url crate refuses to parse is still resolved: it is joined
// to the base directory as a literal path. Nothing here touches the network.
// =============================================================================

use url::Url;

/// Resolves `reference` against `base`, always producing an absolute URL.
///
/// Examples (base = "https://example.com/path/playlist.m3u8"):
///   "segment.ts"                   -> "https://example.com/path/segment.ts"
///   "/absolute/segment.ts"         -> "https://example.com/absolute/segment.ts"
///   "https://other.com/segment.ts" -> unchanged
///   "../segment.ts"                -> "https://example.com/segment.ts"
pub fn resolve(base: &Url, reference: &str) -> String {
    match Url::parse(reference) {
        // Already absolute: keep the text exactly as the playlist wrote it
        Ok(_) => reference.to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base.join(reference) {
            Ok(joined) => joined.to_string(),
            Err(_) => join_literal(base, reference),
        },
        Err(_) => join_literal(base, reference),
    }
}

/// Fallback for references the url crate cannot parse: treat the text as a
/// plain path relative to the base URL's directory.
fn join_literal(base: &Url, reference: &str) -> String {
    let dir = match base.path().rfind('/') {
        Some(idx) => &base.path()[..idx],
        None => "",
    };

    let joined = if reference.starts_with('/') {
        collapse_dot_segments(reference)
    } else {
        collapse_dot_segments(&format!("{}/{}", dir, reference))
    };

    let mut resolved = base.clone();
    resolved.set_query(None);
    resolved.set_fragment(None);
    resolved.set_path(&joined);
    resolved.to_string()
}

/// Removes empty, "." and ".." segments from a slash-separated path.
/// The result always starts with "/"; ".." never climbs above the root.
pub fn collapse_dot_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    format!("/{}", segments.join("/"))
}
