// src/config/validation.rs
// Validation results for config.toml, keyed by the offending setting

use std::fmt;

/// One problem found in the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Dotted path of the setting, e.g. `backends[gw].credential`
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<ConfigIssue>,
    pub errors: Vec<ConfigIssue>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors block a review; warnings only get logged
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, field: impl Into<String>, msg: impl Into<String>) {
        self.warnings.push(ConfigIssue {
            field: field.into(),
            message: msg.into(),
        });
    }

    pub fn add_error(&mut self, field: impl Into<String>, msg: impl Into<String>) {
        self.errors.push(ConfigIssue {
            field: field.into(),
            message: msg.into(),
        });
    }

    /// Errors reported against `field`
    pub fn errors_for(&self, field: &str) -> Vec<&ConfigIssue> {
        self.errors.iter().filter(|e| e.field == field).collect()
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            lines.extend(self.errors.iter().map(|e| format!("  - {}", e)));
        }
        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            lines.extend(self.warnings.iter().map(|w| format!("  - {}", w)));
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_ok() {
        assert_eq!(ConfigValidation::new().report(), "Configuration OK");
    }

    #[test]
    fn test_report_prefixes_field_path() {
        let mut validation = ConfigValidation::new();
        validation.add_error("review.max_chunk_bytes", "must be greater than 0");
        validation.add_warning("backends", "none configured");
        assert!(!validation.is_valid());
        let report = validation.report();
        assert!(report.starts_with("Errors:\n  - review.max_chunk_bytes: must be greater than 0"));
        assert!(report.contains("Warnings:\n  - backends: none configured"));
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let mut validation = ConfigValidation::new();
        validation.add_warning("review.temperature", "outside 0.0..=2.0");
        assert!(validation.is_valid());
    }

    #[test]
    fn test_errors_for_field() {
        let mut validation = ConfigValidation::new();
        validation.add_error("credentials.corp.client_secret", "missing");
        validation.add_error("review.max_attempts", "must be at least 1");
        let hits = validation.errors_for("review.max_attempts");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message, "must be at least 1");
        assert!(validation.errors_for("review.deadline_secs").is_empty());
    }
}
