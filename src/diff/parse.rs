// src/diff/parse.rs
// Unified diff parsing into per-file segments

use super::types::{DiffFileSegment, UNKNOWN_PATH};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static FILE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^diff --git a/(?P<a>.+) b/(?P<b>.+)$").expect("valid diff header regex")
});

/// Parse a unified diff into file segments, in source order.
///
/// Text before the first `diff --git` header is ignored. A patch with no
/// header at all (the per-file `patch` field of the commits API) becomes a
/// single segment with an unknown path.
pub fn parse_unified_diff(diff_text: &str) -> Vec<DiffFileSegment> {
    let lines = split_lines(diff_text);
    let mut segments = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if let Some(segment) = parse_file_block(&lines, &mut i) {
            segments.push(segment);
        } else {
            i += 1;
        }
    }

    if segments.is_empty() && lines.iter().any(|l| l.starts_with("@@")) {
        let mut segment = DiffFileSegment::new(UNKNOWN_PATH);
        let (preamble, hunks) = split_hunks(&lines);
        segment.preamble = preamble;
        segment.hunks = hunks;
        segments.push(segment);
    }

    segments
}

/// Split on `\n` only, so a CRLF line keeps its `\r`
pub(crate) fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n')
        .map(|line| line.strip_suffix('\n').unwrap_or(line))
        .collect()
}

fn parse_file_block(lines: &[&str], index: &mut usize) -> Option<DiffFileSegment> {
    let header = lines.get(*index)?;
    let captures = FILE_HEADER_RE.captures(header)?;
    let a_path = captures.name("a").map(|m| m.as_str().trim_end_matches('\r').to_string())?;
    let b_path = captures.name("b").map(|m| m.as_str().trim_end_matches('\r').to_string())?;

    let start = *index;
    *index += 1;
    while *index < lines.len() && !lines[*index].starts_with("diff --git ") {
        *index += 1;
    }

    let block = &lines[start..*index];
    let (preamble, hunks) = split_hunks(block);

    let renamed_from = preamble
        .iter()
        .find_map(|l| l.strip_prefix("rename from ").map(|p| p.trim_end_matches('\r').to_string()));
    let old_path = renamed_from.or_else(|| (a_path != b_path).then(|| a_path.clone()));

    Some(DiffFileSegment {
        path: b_path,
        old_path,
        preamble,
        hunks,
        trailer: Vec::new(),
        is_generated: false,
    })
}

/// Split a file block into preamble lines and verbatim hunk texts
pub(crate) fn split_hunks(block: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut preamble = Vec::new();
    let mut hunks: Vec<String> = Vec::new();

    for line in block {
        if line.starts_with("@@") {
            hunks.push((*line).to_string());
        } else if let Some(current) = hunks.last_mut() {
            current.push('\n');
            current.push_str(line);
        } else {
            preamble.push((*line).to_string());
        }
    }

    (preamble, hunks)
}

/// Unique new-side paths touched by the segments, in first-seen order
pub fn changed_paths(segments: &[DiffFileSegment]) -> Vec<String> {
    let mut seen = HashSet::new();
    segments
        .iter()
        .filter(|s| seen.insert(s.path.as_str()))
        .map(|s| s.path.clone())
        .collect()
}
