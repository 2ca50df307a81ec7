// src/diff/filter.rs
// Generated-file detection: path globs, file-name regexes and header markers

use super::types::DiffFileSegment;
use glob::Pattern;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How many lines into the first hunk a header marker may appear
pub const MARKER_SCAN_LINES: usize = 5;

/// Raw generated-file rules as they appear in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedRules {
    #[serde(default)]
    pub path_globs: Vec<String>,
    #[serde(default)]
    pub name_regexes: Vec<String>,
    #[serde(default)]
    pub header_markers: Vec<String>,
}

impl Default for GeneratedRules {
    fn default() -> Self {
        Self {
            path_globs: [
                "**/dist/**",
                "**/build/generated/**",
                "**/node_modules/**",
                "**/vendor/**",
                "*.min.js",
                "*.min.css",
            ]
            .map(String::from)
            .to_vec(),
            name_regexes: [
                r"\.pb\.go$",
                r"_pb2(_grpc)?\.py$",
                r"\.g\.dart$",
                r"\.generated\.\w+$",
                r"^package-lock\.json$",
            ]
            .map(String::from)
            .to_vec(),
            header_markers: ["code generated", "do not edit", "@generated", "auto-generated"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Why a segment was classified as generated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedMatch {
    Glob(String),
    Name(String),
    Marker(String),
}

/// Result of filtering: segments to review and segments dropped as generated
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<DiffFileSegment>,
    pub excluded: Vec<DiffFileSegment>,
}

impl FilterOutcome {
    /// Paths of the excluded segments
    pub fn excluded_paths(&self) -> Vec<String> {
        self.excluded.iter().map(|s| s.path.clone()).collect()
    }
}

/// Compiled generated-file rules.
///
/// Invalid globs or regexes are skipped with a warning; a bad rule never
/// blocks a review.
#[derive(Debug, Default)]
pub struct GeneratedFileFilter {
    globs: Vec<Pattern>,
    regexes: Vec<Regex>,
    markers: Vec<String>,
}

impl GeneratedFileFilter {
    pub fn new(rules: &GeneratedRules) -> Self {
        let globs = rules
            .path_globs
            .iter()
            .filter_map(|g| match Pattern::new(g) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(glob = %g, error = %e, "Ignoring invalid generated-file glob");
                    None
                }
            })
            .collect();

        let regexes = rules
            .name_regexes
            .iter()
            .filter_map(|r| match RegexBuilder::new(r).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(regex = %r, error = %e, "Ignoring invalid generated-file regex");
                    None
                }
            })
            .collect();

        let markers = rules
            .header_markers
            .iter()
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();

        Self {
            globs,
            regexes,
            markers,
        }
    }

    /// Classify one segment; `None` means it is reviewable
    pub fn classify(&self, segment: &DiffFileSegment) -> Option<GeneratedMatch> {
        let path = segment.path.trim();

        if let Some(glob) = self.globs.iter().find(|g| g.matches(path)) {
            return Some(GeneratedMatch::Glob(glob.as_str().to_string()));
        }

        let name = segment.file_name();
        if let Some(re) = self.regexes.iter().find(|re| re.is_match(name)) {
            return Some(GeneratedMatch::Name(re.as_str().to_string()));
        }

        if !self.markers.is_empty() {
            for line in segment.first_hunk_added_lines(MARKER_SCAN_LINES) {
                let lowered = line.to_lowercase();
                if let Some(marker) = self.markers.iter().find(|m| lowered.contains(m.as_str())) {
                    return Some(GeneratedMatch::Marker(marker.clone()));
                }
            }
        }

        None
    }

    /// Split segments into reviewable and generated, preserving order
    pub fn filter(&self, segments: Vec<DiffFileSegment>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for mut segment in segments {
            match self.classify(&segment) {
                Some(reason) => {
                    debug!(path = %segment.path, reason = ?reason, "Excluding generated file");
                    segment.is_generated = true;
                    outcome.excluded.push(segment);
                }
                None => outcome.kept.push(segment),
            }
        }
        outcome
    }
}
