//! `webhook` handler (§4.5 table): outbound HTTP POST to a configured URL.
//! Distinct from the inbound webhook *trigger* dispatched by
//! `flowpilot-triggers` — this node fires a webhook, it doesn't receive one.

use async_trait::async_trait;
use flowpilot_core::{Error, HandlerContext, NodeHandler, NodeKind, Result};
use serde_json::Value;

pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for WebhookHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::Webhook(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not a webhook node", ctx.node.id))),
        };

        let mut request = self.client.post(&cfg.url).json(&cfg.body);
        for (name, value) in &cfg.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream("webhook", e.to_string()))?;
        let status = response.status().as_u16();
        Ok(serde_json::json!({ "status": status }))
    }
}
