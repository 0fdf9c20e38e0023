//! Built-in `NodeHandler` implementations, one per row of the Handler
//! Registry table (§4.5).

pub mod ai;
pub mod condition;
pub mod connector;
pub mod delay;
pub mod email;
pub mod http_request;
pub mod variable;
pub mod webhook;

use std::sync::Arc;

use flowpilot_core::{AiClient, CacheStore, ConnectorClient, Notifier};

use crate::registry::HandlerRegistry;

/// Registers every built-in handler under its canonical `type_name`. Callers
/// assembling a non-default registry (tests, alternate deployments) build
/// one by hand instead of calling this.
pub fn register_default_handlers(
    registry: &mut HandlerRegistry,
    ai_client: Arc<dyn AiClient>,
    cache: Arc<dyn CacheStore>,
    connector_client: Arc<dyn ConnectorClient>,
    notifier: Arc<dyn Notifier>,
    http_client: reqwest::Client,
) {
    registry.register("ai", Arc::new(ai::AiHandler::new(ai_client, cache)));
    registry.register("connector", Arc::new(connector::ConnectorHandler::new(connector_client)));
    registry.register("http_request", Arc::new(http_request::HttpRequestHandler::new(http_client.clone())));
    registry.register("webhook", Arc::new(webhook::WebhookHandler::new(http_client)));
    registry.register("delay", Arc::new(delay::DelayHandler));
    registry.register("condition", Arc::new(condition::ConditionHandler));
    registry.register("variable", Arc::new(variable::VariableHandler));
    registry.register("email", Arc::new(email::EmailHandler::new(notifier)));
}
