//! `http_request` handler (§4.5 table): a generic outbound HTTP call.

use async_trait::async_trait;
use flowpilot_core::{Error, HandlerContext, NodeHandler, NodeKind, Result};
use serde_json::Value;

pub struct HttpRequestHandler {
    client: reqwest::Client,
}

impl HttpRequestHandler {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::HttpRequest(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not an http_request node", ctx.node.id))),
        };

        let method: reqwest::Method = cfg
            .method
            .parse()
            .map_err(|_| Error::validation(format!("invalid http method '{}'", cfg.method)))?;

        let mut request = self.client.request(method, &cfg.url).timeout(std::time::Duration::from_secs(cfg.timeout_secs));
        for (name, value) in &cfg.headers {
            request = request.header(name, value);
        }
        if !cfg.body.is_null() {
            request = request.json(&cfg.body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream("http_request", e.to_string()))?;
        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!(null));

        Ok(serde_json::json!({ "status": status, "body": body }))
    }
}
