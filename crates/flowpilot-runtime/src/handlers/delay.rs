//! `delay` handler (§4.5 table): sleeps `config.seconds`, a suspension
//! point rather than a true side effect, and the canonical example of the
//! interruptible suspension points named in §5 — the sleep races the
//! execution's cancellation signal rather than running it out.

use std::time::Duration;

use async_trait::async_trait;
use flowpilot_core::{Error, HandlerContext, NodeHandler, NodeKind, Result};
use serde_json::Value;

pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::Delay(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not a delay node", ctx.node.id))),
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cfg.seconds)) => {
                Ok(serde_json::json!({ "slept_seconds": cfg.seconds }))
            }
            _ = ctx.cancellation.cancelled() => {
                Err(Error::timeout(Duration::from_secs(cfg.seconds)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{CancellationToken, Execution, ExecutionStep, Node};
    use std::collections::HashMap;
    use uuid::Uuid;

    #[tokio::test]
    async fn sleeps_the_configured_duration() {
        let handler = DelayHandler;
        let node = Node { id: "d".to_string(), name: None, type_name: "delay".to_string(), config: serde_json::json!({"seconds": 0}) };
        let execution = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        let step = ExecutionStep::new(execution.id, &node.id, "delay", 1, serde_json::json!({}));
        let context = HashMap::new();

        let out = handler
            .handle(HandlerContext { node: &node, context: &context, execution: &execution, step: &step, cancellation: CancellationToken::new() })
            .await
            .unwrap();
        assert_eq!(out["slept_seconds"], serde_json::json!(0));
    }
}
