// src/diff/history.rs
// File-history mode: one segment per commit touching a file

use super::parse::{split_hunks, split_lines};
use super::types::DiffFileSegment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_MESSAGE_CHARS: usize = 220;
const SHORT_SHA_LEN: usize = 7;

/// One commit's change to the file under review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPatch {
    pub sha: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub message: String,
    /// Per-file patch text; absent for binary or too-large changes
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default)]
    pub other_files: Vec<String>,
}

impl CommitPatch {
    pub fn short_sha(&self) -> &str {
        match self.sha.char_indices().nth(SHORT_SHA_LEN) {
            Some((idx, _)) => &self.sha[..idx],
            None => &self.sha,
        }
    }

    /// First line of the message, capped at 220 chars
    pub fn headline(&self) -> String {
        let first = self.message.lines().next().unwrap_or("").trim();
        first.chars().take(MAX_MESSAGE_CHARS).collect()
    }
}

/// Render an ISO-8601 timestamp as `YYYY-MM-DD HH:MM` UTC, or return it unchanged
pub fn format_commit_date(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Build one segment per commit, in the given order
pub fn commit_segments(file_path: &str, commits: &[CommitPatch]) -> Vec<DiffFileSegment> {
    commits
        .iter()
        .map(|commit| commit_segment(file_path, commit))
        .collect()
}

fn commit_segment(file_path: &str, commit: &CommitPatch) -> DiffFileSegment {
    let mut segment = DiffFileSegment::new(file_path);

    segment.preamble.push(format!(
        "=== Commit {} \u{2014} {} \u{2014} {} ===",
        commit.short_sha(),
        format_commit_date(&commit.date),
        commit.author
    ));
    segment.preamble.push(format!("Message: {}", commit.headline()));
    segment.preamble.push(format!("File: {}", file_path));

    match commit.patch.as_deref().filter(|p| !p.trim().is_empty()) {
        Some(patch) => {
            let lines = split_lines(patch);
            let (extra, hunks) = split_hunks(&lines);
            segment.preamble.extend(extra);
            segment.hunks = hunks;
        }
        None => segment
            .preamble
            .push("(No patch for this file in this commit)".to_string()),
    }

    if !commit.other_files.is_empty() {
        segment.trailer.push(String::new());
        segment.trailer.push("Other files modified:".to_string());
        segment
            .trailer
            .extend(commit.other_files.iter().map(|f| format!("- {}", f)));
    }

    segment
}
