// src/crawl/filter.rs
// =============================================================================
// Include/exclude filtering of discovered references by file extension.
//
// Rules, in order:
// 1. Nested playlists always pass. Skipping one would also hide everything
//    it references, so playlists are traversed whatever the filters say.
// 2. An extension on the exclude list drops the reference.
// 3. With a non-empty include list, only listed extensions pass.
// =============================================================================

use url::Url;

use crate::playlist::Reference;

#[derive(Debug, Clone, Default)]
pub struct ExtensionFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ExtensionFilter {
    /// Both lists must already be normalized (".ts", lower case).
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        ExtensionFilter { include, exclude }
    }

    pub fn allows(&self, reference: &Reference) -> bool {
        if reference.is_playlist {
            return true;
        }

        let ext = extension_of(&reference.url);

        if self.exclude.iter().any(|e| *e == ext) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|e| *e == ext)
    }
}

/// Lower-cased extension (with leading '.') of the last path segment of a
/// URL, ignoring query and fragment. Empty if there is none.
pub fn extension_of(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };

    let name = path.rsplit('/').next().unwrap_or("");
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(url: &str, is_playlist: bool) -> Reference {
        Reference {
            url: url.to_string(),
            is_playlist,
        }
    }

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("https://example.com/a/seg.TS?x=1.mp4"), ".ts");
        assert_eq!(extension_of("https://example.com/a/key"), "");
        assert_eq!(extension_of("https://example.com/a/"), "");
        assert_eq!(extension_of("https://example.com/a/.hidden"), "");
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        let filter = ExtensionFilter::default();
        assert!(filter.allows(&reference("https://example.com/a.vtt", false)));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = ExtensionFilter::new(exts(&[".ts", ".vtt"]), exts(&[".vtt"]));
        assert!(filter.allows(&reference("https://example.com/a.ts", false)));
        assert!(!filter.allows(&reference("https://example.com/a.vtt", false)));
    }

    #[test]
    fn test_include_list_restricts() {
        let filter = ExtensionFilter::new(exts(&[".ts"]), Vec::new());
        assert!(filter.allows(&reference("https://example.com/a.ts?t=1", false)));
        assert!(!filter.allows(&reference("https://example.com/enc.key", false)));
    }

    #[test]
    fn test_nested_playlists_bypass_filters() {
        let filter = ExtensionFilter::new(exts(&[".ts"]), exts(&[".m3u8"]));
        assert!(filter.allows(&reference("https://example.com/low/index.m3u8", true)));
        // A tag reference that happens to end in .m3u8 is not a nested playlist
        assert!(!filter.allows(&reference("https://example.com/audio/index.m3u8", false)));
    }
}
