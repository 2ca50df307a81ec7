// src/llm/mod.rs
// Model backend clients (authenticated gateway, local Ollama)

mod credentials;
mod gateway;
mod http_client;
mod logging;
mod ollama;
mod openai_compat;
mod provider;
mod registry;

pub use credentials::{AccessToken, ClientCredentials, CredentialCache, PreissuedToken, TokenSource};
pub use gateway::{GatewayClient, GatewayOptions};
pub use http_client::{BackendHttpClient, classify_status};
pub use ollama::OllamaClient;
pub use openai_compat::{ChatRequest, parse_chat_response};
pub use provider::{Message, ModelBackend, Prompt, Provider};
pub use registry::BackendRegistry;
