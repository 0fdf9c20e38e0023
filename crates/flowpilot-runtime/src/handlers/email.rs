//! `email` handler (§4.5 table): composes a message and hands it off to the
//! `Notifier`. Actual delivery is out of scope (§1 Non-goals); the
//! `Notifier` implementation decides what "sent" means.

use std::sync::Arc;

use async_trait::async_trait;
use flowpilot_core::{Error, HandlerContext, NodeHandler, NodeKind, Notifier, Result};
use serde_json::Value;

pub struct EmailHandler {
    notifier: Arc<dyn Notifier>,
}

impl EmailHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl NodeHandler for EmailHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::Email(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not an email node", ctx.node.id))),
        };
        self.notifier.send("email", &cfg.to, &cfg.subject, &cfg.body).await?;
        Ok(serde_json::json!({ "sent_to": cfg.to, "subject": cfg.subject }))
    }
}
