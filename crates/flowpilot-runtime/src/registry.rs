//! The Handler Registry (§4.5): resolves a node's `type_name` to the
//! `NodeHandler` that executes it. Exact match first, then a prefix
//! fallback so forward-compatible type names like `"ai_summarize"` or
//! `"connector_slack"` still route to the base handler for their kind.

use std::collections::HashMap;
use std::sync::Arc;

use flowpilot_core::{Error, NodeHandler, Result};

/// The base kinds every node `type_name` is expected to fall back to,
/// checked longest-prefix-first so e.g. `"http_request_get"` doesn't match
/// `"http"` before `"http_request"`.
const BASE_KINDS: &[&str] = &[
    "ai", "connector", "http_request", "webhook", "delay", "condition", "variable", "email",
];

pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn NodeHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, type_name: impl Into<String>, handler: Arc<dyn NodeHandler>) {
        self.handlers.insert(type_name.into(), handler);
    }

    /// Exact match on `type_name`, then the longest registered base-kind
    /// prefix it starts with. Returns `NotFound` if neither resolves —
    /// the Runner turns that into a failed step, never a panic.
    pub fn resolve(&self, type_name: &str) -> Result<Arc<dyn NodeHandler>> {
        if let Some(handler) = self.handlers.get(type_name) {
            return Ok(handler.clone());
        }
        let mut candidates: Vec<&&str> = BASE_KINDS
            .iter()
            .filter(|kind| type_name.starts_with(**kind))
            .collect();
        candidates.sort_by_key(|kind| std::cmp::Reverse(kind.len()));
        for kind in candidates {
            if let Some(handler) = self.handlers.get(*kind) {
                return Ok(handler.clone());
            }
        }
        Err(Error::not_found(format!("no handler registered for node type '{type_name}'")))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowpilot_core::HandlerContext;
    use serde_json::Value;

    struct StubHandler(&'static str);

    #[async_trait]
    impl NodeHandler for StubHandler {
        async fn handle(&self, _ctx: HandlerContext<'_>) -> Result<Value> {
            Ok(serde_json::json!({"handled_by": self.0}))
        }
    }

    #[test]
    fn exact_match_wins_over_prefix() {
        let mut registry = HandlerRegistry::new();
        registry.register("ai", Arc::new(StubHandler("ai")));
        registry.register("ai_summarize", Arc::new(StubHandler("ai_summarize")));
        assert!(registry.resolve("ai_summarize").is_ok());
    }

    #[test]
    fn unregistered_prefix_falls_back_to_base_kind() {
        let mut registry = HandlerRegistry::new();
        registry.register("connector", Arc::new(StubHandler("connector")));
        assert!(registry.resolve("connector_slack").is_ok());
    }

    #[test]
    fn unknown_type_name_is_not_found() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve("unknown_thing").is_err());
    }
}
