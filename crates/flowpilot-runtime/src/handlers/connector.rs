//! `connector` handler (§4.5 table): dispatches to the Connector Service for
//! the node's configured provider + action.

use std::sync::Arc;

use async_trait::async_trait;
use flowpilot_core::{ConnectorClient, Error, HandlerContext, NodeHandler, NodeKind, Result};
use serde_json::Value;

pub struct ConnectorHandler {
    client: Arc<dyn ConnectorClient>,
}

impl ConnectorHandler {
    pub fn new(client: Arc<dyn ConnectorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for ConnectorHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::Connector(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not a connector node", ctx.node.id))),
        };
        let result = self
            .client
            .invoke(&cfg.provider, &cfg.action, &cfg.credential_ref, &cfg.payload)
            .await?;
        Ok(serde_json::json!({ "result": result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_connectors::FakeConnectorClient;
    use flowpilot_core::{CancellationToken, Execution, ExecutionStep, Node};
    use std::collections::HashMap;
    use uuid::Uuid;

    #[tokio::test]
    async fn invokes_connector_with_configured_provider_and_action() {
        let client: Arc<dyn ConnectorClient> = Arc::new(FakeConnectorClient::default());
        let handler = ConnectorHandler::new(client);

        let node = Node {
            id: "c1".to_string(),
            name: None,
            type_name: "connector".to_string(),
            config: serde_json::json!({
                "provider": "slack",
                "action": "post_message",
                "credential_ref": "cred-1",
                "payload": {"text": "hi"},
            }),
        };
        let execution = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        let step = ExecutionStep::new(execution.id, &node.id, "connector", 1, serde_json::json!({}));
        let context = HashMap::new();

        let out = handler
            .handle(HandlerContext { node: &node, context: &context, execution: &execution, step: &step, cancellation: CancellationToken::new() })
            .await
            .unwrap();
        assert!(out.get("result").is_some());
    }
}
