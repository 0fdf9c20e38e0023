//! `condition` node handler (§4.5 table): evaluates a boolean expression
//! over `context`. The node's own output is just the boolean result — edge
//! `condition`s, evaluated separately by the Runner, are what actually
//! route the DAG around it.

use async_trait::async_trait;
use flowpilot_core::{Error, HandlerContext, NodeHandler, NodeKind, Result};
use serde_json::Value;

pub struct ConditionHandler;

#[async_trait]
impl NodeHandler for ConditionHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::Condition(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not a condition node", ctx.node.id))),
        };
        let result = crate::condition::evaluate(&cfg.expr, ctx.context)?;
        Ok(serde_json::json!({ "result": result }))
    }
}
