// src/storage/mod.rs
// =============================================================================
// Where mirrored files go.
//
// Submodules:
// - paths: the URL -> local path assignment (hierarchical or flattened)
// - sink: atomic writes of fetched bytes to those paths
// =============================================================================

mod paths;
mod sink;

pub use paths::{Layout, PathMapper};
pub use sink::{FileSink, Sink};
