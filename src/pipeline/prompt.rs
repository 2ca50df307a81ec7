// src/pipeline/prompt.rs
// Prompt templates with content and part placeholders

use crate::llm::Prompt;
use serde::{Deserialize, Serialize};

/// Replaced with the chunk (or synthesis source) text
pub const CONTENT_PLACEHOLDER: &str = "{{content}}";
/// Replaced with `Part i of n`
pub const PART_PLACEHOLDER: &str = "{{part}}";

/// Shared system prompt for every reviewer
const REVIEWER_SYSTEM: &str = "You are a senior software engineer performing a careful code review. \
Be specific, cite file paths and line context, and do not invent code that is not in the diff.";

const REVIEW_INSTRUCTIONS: &str = r#"Review the following pull request changes ({{part}}).
For each file:
- Summarize what changed and why it matters
- Point out bugs, security problems and risky patterns
- Suggest concrete improvements
Then add a "Suggested Test Cases" section: a prioritized list, each case with concrete inputs, steps and the expected outcome.
Cover happy-path, negative, edge/boundary, error-handling, concurrency/race, performance and security scenarios as applicable.
Some parts of a large pull request are reviewed separately; only comment on what you can see."#;

const HISTORY_INSTRUCTIONS: &str = r#"Below is the commit history of one file ({{part}}).
For each commit, explain what changed in this file and how it relates to the other files modified in the same commit.
Then describe how the file evolved over these commits."#;

const SYNTHESIS_INSTRUCTIONS: &str = r#"You are given reviews of the same changes written by several models.
Produce one consolidated review:
- Merge overlapping points and remove duplicates
- Keep concrete descriptions of issues, with file paths
- Note where the models disagree
- Conclude with an overall narrative of the change and its risks
Sections marked unavailable could not be produced; do not speculate about them."#;

/// Template for one kind of model call.
///
/// `user` must contain [`CONTENT_PLACEHOLDER`]; when it does not, the
/// content is appended after a blank line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub user: String,
}

impl PromptTemplate {
    /// Default template for reviewing a chunk of a pull request diff
    pub fn review() -> Self {
        Self {
            system: Some(REVIEWER_SYSTEM.into()),
            instructions: Some(REVIEW_INSTRUCTIONS.into()),
            user: "```diff\n{{content}}```".into(),
        }
    }

    /// Default template for reviewing commits that touched one file
    pub fn file_history() -> Self {
        Self {
            system: Some(REVIEWER_SYSTEM.into()),
            instructions: Some(HISTORY_INSTRUCTIONS.into()),
            user: "{{content}}".into(),
        }
    }

    /// Default template for merging several models' reviews
    pub fn synthesis() -> Self {
        Self {
            system: Some(REVIEWER_SYSTEM.into()),
            instructions: Some(SYNTHESIS_INSTRUCTIONS.into()),
            user: "{{content}}".into(),
        }
    }

    /// Substitute `content` and the part label (`index` is zero-based)
    pub fn render(&self, content: &str, index: usize, count: usize) -> Prompt {
        let part = format!("Part {} of {}", index + 1, count.max(1));
        let fill = |text: &str| text.replace(PART_PLACEHOLDER, &part);

        let user = if self.user.contains(CONTENT_PLACEHOLDER) {
            fill(&self.user).replace(CONTENT_PLACEHOLDER, content)
        } else if self.user.trim().is_empty() {
            content.to_string()
        } else {
            format!("{}\n\n{}", fill(&self.user), content)
        };

        Prompt {
            system: self.system.as_deref().map(fill),
            instructions: self.instructions.as_deref().map(fill),
            user,
        }
    }
}

/// Templates for every call the pipeline makes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub review: PromptTemplate,
    pub history: PromptTemplate,
    pub synthesis: PromptTemplate,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            review: PromptTemplate::review(),
            history: PromptTemplate::file_history(),
            synthesis: PromptTemplate::synthesis(),
        }
    }
}
