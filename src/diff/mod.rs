// src/diff/mod.rs
// Diff parsing, generated-file filtering and chunking

mod chunk;
mod filter;
mod history;
mod parse;
mod types;

pub use chunk::{Chunk, chunk_segments};
pub use filter::{FilterOutcome, GeneratedFileFilter, GeneratedMatch, GeneratedRules, MARKER_SCAN_LINES};
pub use history::{CommitPatch, commit_segments, format_commit_date};
pub use parse::{changed_paths, parse_unified_diff};
pub use types::{DiffFileSegment, UNKNOWN_PATH};
