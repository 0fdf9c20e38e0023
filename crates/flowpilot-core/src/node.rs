//! Tagged node configuration, replacing the stringly-typed `config` JSON
//! blob the distilled spec describes. Parsed once on workflow load; an
//! `Unknown` variant keeps forward-compatibility with node types this
//! engine doesn't yet understand instead of failing the whole graph.
//!
//! Mirrors the shape `aof-core::agentflow::NodeType`/`NodeConfig` used for
//! its own per-node-type configuration in the teacher workspace, generalized
//! here into a real tagged enum (rather than one flattened struct) because
//! the spec requires `Unknown` to round-trip the raw JSON losslessly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiNodeConfig {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_cache_ttl_secs() -> i64 {
    24 * 3600
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorNodeConfig {
    pub provider: String,
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Reference to the credential to decrypt at the point of use; never
    /// the credential material itself.
    pub credential_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequestNodeConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookNodeConfig {
    pub url: String,
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayNodeConfig {
    pub seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionNodeConfig {
    /// A small boolean expression evaluated over `context`, e.g. `"x > 0"`.
    pub expr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableNodeConfig {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailNodeConfig {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// A node's configuration, tagged by `type`. Unknown types round-trip their
/// raw JSON so a graph referencing a not-yet-implemented handler still
/// loads and validates (the handler dispatch itself fails at execution
/// time, not at load time).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum NodeKind {
    #[serde(rename = "ai")]
    Ai(AiNodeConfig),
    Connector(ConnectorNodeConfig),
    HttpRequest(HttpRequestNodeConfig),
    Webhook(WebhookNodeConfig),
    Delay(DelayNodeConfig),
    Condition(ConditionNodeConfig),
    Variable(VariableNodeConfig),
    Email(EmailNodeConfig),
    #[serde(other)]
    Unknown,
}

impl NodeKind {
    /// Parses a node's raw `{type, config}` pair. Unrecognized types never
    /// fail parsing; they become `Unknown` carrying the original config so
    /// the node can still be stored and re-serialized without loss.
    pub fn from_raw(type_name: &str, config: &serde_json::Value) -> (Self, serde_json::Value) {
        let tagged = serde_json::json!({ "type": type_name, "config": config });
        match serde_json::from_value::<NodeKind>(tagged) {
            Ok(NodeKind::Unknown) | Err(_) => (NodeKind::Unknown, config.clone()),
            Ok(other) => (other, config.clone()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Ai(_) => "ai",
            NodeKind::Connector(_) => "connector",
            NodeKind::HttpRequest(_) => "http_request",
            NodeKind::Webhook(_) => "webhook",
            NodeKind::Delay(_) => "delay",
            NodeKind::Condition(_) => "condition",
            NodeKind::Variable(_) => "variable",
            NodeKind::Email(_) => "email",
            NodeKind::Unknown => "unknown",
        }
    }
}

/// One vertex in a workflow's graph definition. `raw_config` is preserved
/// verbatim (not just for `Unknown`) so the store always normalizes and
/// round-trips exactly what was submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_raw(&self.type_name, &self.config).0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// A small boolean expression over `context`; absent means
    /// unconditional. May also match on upstream step status (e.g.
    /// `"status == failed"`) to mark an edge as failure-tolerant.
    #[serde(default)]
    pub condition: Option<String>,
}

/// The `{nodes, edges}` graph a `Workflow`/`WorkflowVersion` carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_round_trips_raw_config() {
        let cfg = serde_json::json!({"anything": 1});
        let (kind, raw) = NodeKind::from_raw("future_node_type", &cfg);
        assert!(matches!(kind, NodeKind::Unknown));
        assert_eq!(raw, cfg);
    }

    #[test]
    fn ai_node_parses_typed_config() {
        let cfg = serde_json::json!({
            "provider": "anthropic",
            "model": "claude-3",
            "prompt": "hello",
        });
        let (kind, _) = NodeKind::from_raw("ai", &cfg);
        match kind {
            NodeKind::Ai(c) => {
                assert_eq!(c.provider, "anthropic");
                assert_eq!(c.cache_ttl_secs, 24 * 3600);
                assert!(c.use_cache);
            }
            _ => panic!("expected Ai variant"),
        }
    }
}
