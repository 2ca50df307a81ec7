// src/diff/types.rs
// Type definitions for diff segments

use serde::{Deserialize, Serialize};

/// Path used when a patch carries no `diff --git` header
pub const UNKNOWN_PATH: &str = "(unknown)";

/// One file's slice of a unified diff.
///
/// `preamble` holds everything before the first `@@` line (the `diff --git`
/// header, mode/index lines, `---`/`+++`), `hunks` holds each hunk verbatim
/// including its `@@` line, and `trailer` holds context appended after the
/// hunks (used by file-history mode). Rendering the three in order
/// reproduces the original block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFileSegment {
    pub path: String,
    pub old_path: Option<String>,
    #[serde(default)]
    pub preamble: Vec<String>,
    pub hunks: Vec<String>,
    #[serde(default)]
    pub trailer: Vec<String>,
    #[serde(default)]
    pub is_generated: bool,
}

impl DiffFileSegment {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: None,
            preamble: Vec::new(),
            hunks: Vec::new(),
            trailer: Vec::new(),
            is_generated: false,
        }
    }

    /// Render the segment back to diff text, newline-terminated
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.size_hint());
        for line in &self.preamble {
            out.push_str(line);
            out.push('\n');
        }
        for hunk in &self.hunks {
            out.push_str(hunk);
            if !hunk.ends_with('\n') {
                out.push('\n');
            }
        }
        for line in &self.trailer {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Approximate size in bytes of the rendered segment
    pub fn size_bytes(&self) -> usize {
        self.render().len()
    }

    fn size_hint(&self) -> usize {
        self.preamble.iter().map(|l| l.len() + 1).sum::<usize>()
            + self.hunks.iter().map(|h| h.len() + 1).sum::<usize>()
            + self.trailer.iter().map(|l| l.len() + 1).sum::<usize>()
    }

    /// File name component of the path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Added lines (without the leading `+`) of the first hunk, up to `limit`
    /// body lines into the hunk
    pub fn first_hunk_added_lines(&self, limit: usize) -> Vec<&str> {
        let Some(first) = self.hunks.first() else {
            return Vec::new();
        };
        first
            .lines()
            .skip(1) // @@ header
            .take(limit)
            .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
            .map(|l| &l[1..])
            .collect()
    }
}
