use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use flowpilot_core::{AiClient, AiGeneration, Error, Result};
use serde::{Deserialize, Serialize};

/// Per-model pricing, in dollars per 1,000 tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
        }
    }
}

/// Connection details for a chat-completions-style HTTP endpoint.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub headers: HashMap<String, String>,
    pub pricing: HashMap<String, ModelPricing>,
}

impl ProviderConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_secs: 60,
            headers: HashMap::new(),
            pricing: HashMap::new(),
        }
    }

    pub fn with_pricing(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.pricing.insert(model.into(), pricing);
        self
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// Generic HTTP `AiClient` speaking an OpenAI-compatible chat-completions
/// request/response shape. Works against any provider that exposes (or is
/// fronted by an adapter that exposes) that shape.
pub struct HttpAiClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpAiClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::internal(format!("failed to build http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn cost_for(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let pricing = self.config.pricing.get(model).copied().unwrap_or_default();
        (input_tokens as f64 / 1000.0) * pricing.input_cost_per_1k
            + (output_tokens as f64 / 1000.0) * pricing.output_cost_per_1k
    }
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn generate(&self, prompt: &str, model: &str, system_prompt: Option<&str>) -> Result<AiGeneration> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: prompt });

        let request = ChatRequest { model, messages };
        let mut req = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request);
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::upstream("ai-provider", format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream("ai-provider", format!("status {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::upstream("ai-provider", format!("invalid response body: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::upstream("ai-provider", "response had no choices"))?;

        let (input_tokens, output_tokens) = match parsed.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
            None => (0, 0),
        };

        Ok(AiGeneration {
            response: choice.message.content,
            input_tokens,
            output_tokens,
            cost: self.cost_for(model, input_tokens, output_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpriced_model_costs_nothing() {
        let config = ProviderConfig::new("https://example.test/v1/chat", "key");
        let client = HttpAiClient::new(config).unwrap();
        assert_eq!(client.cost_for("unknown-model", 1000, 1000), 0.0);
    }

    #[test]
    fn pricing_scales_with_tokens() {
        let config = ProviderConfig::new("https://example.test/v1/chat", "key").with_pricing(
            "gpt-4o",
            ModelPricing { input_cost_per_1k: 0.01, output_cost_per_1k: 0.03 },
        );
        let client = HttpAiClient::new(config).unwrap();
        let cost = client.cost_for("gpt-4o", 2000, 1000);
        assert!((cost - 0.05).abs() < 1e-9);
    }
}
