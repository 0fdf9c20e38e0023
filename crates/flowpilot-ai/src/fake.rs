use async_trait::async_trait;
use flowpilot_core::{AiClient, AiGeneration, Result};

/// Deterministic `AiClient` with no network access.
///
/// Token counts are derived from whitespace-split word counts so tests can
/// assert on cost without depending on a real provider's tokenizer. Cost is
/// a fixed $0.001 per token, split evenly across input/output.
#[derive(Debug, Clone, Default)]
pub struct FakeAiClient {
    prefix: String,
}

impl FakeAiClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes every generated response, useful for distinguishing fake
    /// clients wired into different test scenarios.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn token_count(text: &str) -> u64 {
        text.split_whitespace().count().max(1) as u64
    }
}

const COST_PER_TOKEN: f64 = 0.001;

#[async_trait]
impl AiClient for FakeAiClient {
    async fn generate(&self, prompt: &str, model: &str, system_prompt: Option<&str>) -> Result<AiGeneration> {
        let input_tokens = Self::token_count(prompt) + system_prompt.map(Self::token_count).unwrap_or(0);
        let response = if self.prefix.is_empty() {
            format!("[{model}] {prompt}")
        } else {
            format!("{}: [{model}] {prompt}", self.prefix)
        };
        let output_tokens = Self::token_count(&response);
        Ok(AiGeneration {
            response,
            input_tokens,
            output_tokens,
            cost: (input_tokens + output_tokens) as f64 * COST_PER_TOKEN,
        })
    }
}
