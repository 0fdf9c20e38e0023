//! `AiClient` implementations for the workflow engine's `ai_*` node handlers.
//!
//! Two implementations ship here, mirroring the fake/HTTP provider split used
//! across the workspace's external-collaborator crates:
//!
//! - [`FakeAiClient`]: deterministic, no network access, used in tests and
//!   local `flowpilotctl` runs without a configured provider.
//! - [`HttpAiClient`]: a generic HTTP provider client configured by base URL,
//!   API key, and a per-model pricing table, speaking a single JSON request/
//!   response shape (suitable for OpenAI-compatible and Anthropic-compatible
//!   chat-completions endpoints behind a thin adapter).

mod fake;
mod http;

pub use fake::FakeAiClient;
pub use http::{HttpAiClient, ModelPricing, ProviderConfig};
