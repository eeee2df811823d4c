// src/playlist/mod.rs
// =============================================================================
// Everything that reads or writes playlist text.
//
// Submodules:
// - tags: the line tokenizer and the table of reference-bearing tags
// - resolve: turns relative references into absolute URLs
// - parse: bytes -> Playlist (ordered list of references)
// - rewrite: swaps references for local relative paths
//
// parse and rewrite both go through tags::scan_line, so they agree on which
// parts of a line are references.
// =============================================================================

mod parse;
mod resolve;
mod rewrite;
mod tags;

pub use parse::{Playlist, Reference};
pub use rewrite::rewrite;
