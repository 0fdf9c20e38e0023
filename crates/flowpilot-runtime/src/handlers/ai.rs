//! `ai` handler (§4.5/§4.6): checks the Semantic Cache before calling the AI
//! Service, records an `AIRequest` either way, and reports tokens/cost in
//! its output so the Runner can fold them into `execution.metrics`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use flowpilot_core::{
    prompt_hash, AiClient, AiRequest, CacheStore, Error, HandlerContext, NodeHandler, NodeKind,
    Result, SemanticCacheEntry,
};
use serde_json::Value;

pub struct AiHandler {
    ai_client: Arc<dyn AiClient>,
    cache: Arc<dyn CacheStore>,
}

impl AiHandler {
    pub fn new(ai_client: Arc<dyn AiClient>, cache: Arc<dyn CacheStore>) -> Self {
        Self { ai_client, cache }
    }
}

#[async_trait]
impl NodeHandler for AiHandler {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let cfg = match ctx.node.kind() {
            NodeKind::Ai(cfg) => cfg,
            _ => return Err(Error::validation(format!("node '{}' is not an ai node", ctx.node.id))),
        };
        let start = std::time::Instant::now();
        let hash = prompt_hash(&cfg.prompt);

        if cfg.use_cache {
            if let Some(entry) = self.cache.lookup(&hash, &cfg.model).await? {
                if entry.is_valid(Utc::now()) {
                    let hit = self.cache.record_hit(&entry.prompt_hash, &entry.model, Utc::now()).await?;
                    self.cache
                        .record_ai_request(AiRequest::new(
                            ctx.execution.id,
                            Some(ctx.step.id),
                            cfg.provider.clone(),
                            cfg.model.clone(),
                            cfg.prompt.clone(),
                            Some(hit.response.clone()),
                            0,
                            0,
                            0.0,
                            start.elapsed().as_millis() as i64,
                            true,
                            None,
                            true,
                        ))
                        .await?;
                    return Ok(serde_json::json!({
                        "response": hit.response,
                        "cached": true,
                        "input_tokens": 0,
                        "output_tokens": 0,
                        "cost": 0.0,
                    }));
                }
            }
        }

        let generation = match self
            .ai_client
            .generate(&cfg.prompt, &cfg.model, cfg.system_prompt.as_deref())
            .await
        {
            Ok(g) => g,
            Err(err) => {
                self.cache
                    .record_ai_request(AiRequest::new(
                        ctx.execution.id,
                        Some(ctx.step.id),
                        cfg.provider.clone(),
                        cfg.model.clone(),
                        cfg.prompt.clone(),
                        None,
                        0,
                        0,
                        0.0,
                        start.elapsed().as_millis() as i64,
                        false,
                        Some(err.to_string()),
                        false,
                    ))
                    .await?;
                return Err(err);
            }
        };

        if cfg.use_cache {
            self.cache
                .upsert(SemanticCacheEntry::new(
                    &cfg.prompt,
                    cfg.model.clone(),
                    generation.response.clone(),
                    cfg.cache_ttl_secs,
                ))
                .await?;
        }

        self.cache
            .record_ai_request(AiRequest::new(
                ctx.execution.id,
                Some(ctx.step.id),
                cfg.provider.clone(),
                cfg.model.clone(),
                cfg.prompt.clone(),
                Some(generation.response.clone()),
                generation.input_tokens,
                generation.output_tokens,
                generation.cost,
                start.elapsed().as_millis() as i64,
                true,
                None,
                false,
            ))
            .await?;

        Ok(serde_json::json!({
            "response": generation.response,
            "cached": false,
            "input_tokens": generation.input_tokens,
            "output_tokens": generation.output_tokens,
            "cost": generation.cost,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_ai::FakeAiClient;
    use flowpilot_core::{CancellationToken, Execution, ExecutionStep, Node};
    use flowpilot_memory::InMemoryCacheStore;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn node() -> Node {
        Node {
            id: "ai_1".to_string(),
            name: None,
            type_name: "ai".to_string(),
            config: serde_json::json!({
                "provider": "anthropic",
                "model": "claude-3",
                "prompt": "summarize this",
            }),
        }
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let ai_client: Arc<dyn AiClient> = Arc::new(FakeAiClient::default());
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let handler = AiHandler::new(ai_client, cache);

        let node = node();
        let execution = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        let step = ExecutionStep::new(execution.id, &node.id, "ai", 1, serde_json::json!({}));
        let context = HashMap::new();

        let first = handler
            .handle(HandlerContext { node: &node, context: &context, execution: &execution, step: &step, cancellation: CancellationToken::new() })
            .await
            .unwrap();
        assert_eq!(first["cached"], serde_json::json!(false));

        let second = handler
            .handle(HandlerContext { node: &node, context: &context, execution: &execution, step: &step, cancellation: CancellationToken::new() })
            .await
            .unwrap();
        assert_eq!(second["cached"], serde_json::json!(true));
        assert_eq!(second["response"], first["response"]);
    }

    #[tokio::test]
    async fn non_ai_node_is_rejected() {
        let ai_client: Arc<dyn AiClient> = Arc::new(FakeAiClient::default());
        let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::new());
        let handler = AiHandler::new(ai_client, cache);

        let node = Node { id: "n".to_string(), name: None, type_name: "delay".to_string(), config: serde_json::json!({"seconds": 1}) };
        let execution = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        let step = ExecutionStep::new(execution.id, &node.id, "delay", 1, serde_json::json!({}));
        let context = HashMap::new();

        let err = handler
            .handle(HandlerContext { node: &node, context: &context, execution: &execution, step: &step, cancellation: CancellationToken::new() })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
