// src/lib.rs
// pr-council: multi-model pull request review

pub mod config;
pub mod diff;
pub mod error;
pub mod llm;
pub mod pipeline;

pub use error::{CouncilError, Result};
pub use pipeline::{ReviewOutcome, ReviewPipeline, ReviewSettings};
