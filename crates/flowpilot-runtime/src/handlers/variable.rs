//! `variable` handler (§4.5 table): assigns a named value into `context`.

use async_trait::async_trait;
use flowpilot_core::{Error, HandlerContext, NodeHandler, NodeKind, Result};
use serde_json::Value;

pub struct VariableHandler;

#[async_trait]
impl NodeHandler for VariableHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::Variable(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not a variable node", ctx.node.id))),
        };
        let mut output = serde_json::Map::new();
        output.insert(cfg.name.clone(), cfg.value.clone());
        Ok(Value::Object(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{CancellationToken, Execution, ExecutionStep, Node};
    use std::collections::HashMap;
    use uuid::Uuid;

    #[tokio::test]
    async fn assigns_configured_value() {
        let handler = VariableHandler;
        let node = Node {
            id: "v".to_string(),
            name: None,
            type_name: "variable".to_string(),
            config: serde_json::json!({"name": "greeting", "value": "hi"}),
        };
        let execution = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        let step = ExecutionStep::new(execution.id, &node.id, "variable", 1, serde_json::json!({}));
        let context = HashMap::new();

        let out = handler
            .handle(HandlerContext { node: &node, context: &context, execution: &execution, step: &step, cancellation: CancellationToken::new() })
            .await
            .unwrap();
        assert_eq!(out["greeting"], serde_json::json!("hi"));
    }
}
