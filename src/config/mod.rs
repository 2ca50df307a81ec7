// src/config/mod.rs
// Configuration

pub mod env;
pub mod file;
pub mod validation;

pub use env::{CredentialEnv, load_dotenv};
pub use file::{BackendConfig, CouncilConfig, CredentialConfig, CredentialMode, FilterConfig, ReviewConfig};
pub use validation::{ConfigIssue, ConfigValidation};
