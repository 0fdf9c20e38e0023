//! The DAG Runner (§4.5): walks a workflow's graph in topological order,
//! dispatching each ready node to its handler, merging output back into a
//! shared `context`, and propagating upstream failure unless an edge
//! explicitly tolerates it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use flowpilot_core::{
    CancellationToken, Edge, Error, Execution, ExecutionError, ExecutionLog, ExecutionStep,
    ExecutionStore, HandlerContext, LogLevel, Node, NodeKind, ResourceKind, Result, StepStatus,
    Workflow,
};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::condition::evaluate;
use crate::metering::UsageMeter;
use crate::registry::HandlerRegistry;

enum Decision {
    Run,
    Skip,
    Fail(ExecutionError),
}

/// Merges a handler's raw output with the terminal status the Runner
/// assigns, so edge conditions can reference `<node_id>.status` the way
/// `b.status == failed` does (§4.5, §9).
fn with_status(output: Value, status: &str) -> Value {
    match output {
        Value::Object(mut map) => {
            map.insert("status".to_string(), Value::String(status.to_string()));
            Value::Object(map)
        }
        other => serde_json::json!({ "value": other, "status": status }),
    }
}

/// Tokens+cost an `ai_*` node reported in its output, for folding into
/// `execution.metrics` and charging the `AiTokens` quota (§4.5, §4.7). Not
/// an `ai` node, or a node whose output doesn't carry the accounting
/// fields (a non-`AiHandler` registered under the `ai` prefix), yields
/// `None` rather than charging garbage.
fn ai_usage_from_output(node: &Node, output: &Value) -> Option<(u64, f64)> {
    if !matches!(node.kind(), NodeKind::Ai(_)) {
        return None;
    }
    let input_tokens = output.get("input_tokens")?.as_u64()?;
    let output_tokens = output.get("output_tokens")?.as_u64()?;
    let cost = output.get("cost").and_then(Value::as_f64).unwrap_or(0.0);
    Some((input_tokens + output_tokens, cost))
}

/// Builds the starting `context`: `execution.input` merged over variable
/// defaults (§4.5 point 2). A required variable with neither a supplied
/// value nor a default fails the execution immediately.
fn build_initial_context(workflow: &Workflow, execution: &Execution) -> Result<HashMap<String, Value>> {
    let mut context = HashMap::new();
    for var in &workflow.variables {
        let value = execution
            .input
            .get(&var.name)
            .cloned()
            .or_else(|| var.default_value.clone());
        match value {
            Some(v) => {
                context.insert(var.name.clone(), v);
            }
            None if var.required => {
                return Err(Error::validation(format!(
                    "required variable '{}' was not supplied and has no default",
                    var.name
                )));
            }
            None => {}
        }
    }
    if let Value::Object(map) = &execution.input {
        for (k, v) in map {
            context.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    Ok(context)
}

/// Whether `node_id` should run, be skipped, or fail the whole execution,
/// based on the terminal status of every upstream node reaching it (join
/// semantics — by construction every inbound edge's source is already
/// terminal by the time a node's in-degree reaches zero).
fn decide_node(
    node_id: &str,
    inbound: &HashMap<&str, Vec<&Edge>>,
    step_statuses: &HashMap<String, StepStatus>,
    context: &HashMap<String, Value>,
) -> Result<Decision> {
    let Some(edges) = inbound.get(node_id) else {
        return Ok(Decision::Run);
    };

    let mut any_condition_false = false;
    for edge in edges {
        let source_status = step_statuses
            .get(edge.source.as_str())
            .copied()
            .unwrap_or(StepStatus::Completed);

        if source_status == StepStatus::Failed {
            let tolerated = match &edge.condition {
                Some(expr) => evaluate(expr, context)?,
                None => false,
            };
            if !tolerated {
                return Ok(Decision::Fail(ExecutionError::new(
                    "upstream_failure",
                    format!("upstream node '{}' failed and edge '{}' does not tolerate it", edge.source, edge.id),
                )));
            }
            continue;
        }

        if let Some(expr) = &edge.condition {
            if !evaluate(expr, context)? {
                any_condition_false = true;
            }
        }
    }

    Ok(if any_condition_false { Decision::Skip } else { Decision::Run })
}

async fn run_single_node(
    store: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    node: Node,
    context: HashMap<String, Value>,
    execution: Execution,
    step_number: u32,
    cancellation: CancellationToken,
    cancellation_grace: Duration,
) -> (String, std::result::Result<Value, Error>) {
    let node_id = node.id.clone();
    let mut step = ExecutionStep::new(
        execution.id,
        node.id.clone(),
        node.type_name.clone(),
        step_number,
        serde_json::json!(context),
    );
    if let Err(e) = store.create_step(step.clone()).await {
        return (node_id, Err(e));
    }
    step.start();
    if let Err(e) = store.save_step(step.clone()).await {
        return (node_id, Err(e));
    }

    let handler = match registry.resolve(&node.type_name) {
        Ok(h) => h,
        Err(e) => {
            step.fail(ExecutionError::new("handler_not_found", e.to_string()));
            let _ = store.save_step(step).await;
            return (node_id, Err(e));
        }
    };

    let handler_ctx = HandlerContext {
        node: &node,
        context: &context,
        execution: &execution,
        step: &step,
        cancellation: cancellation.clone(),
    };

    // Races the handler against the execution's cancellation signal: a
    // handler with its own internal `select!` (e.g. `delay`) returns
    // immediately once cancelled; one without gets a bounded grace period
    // to unwind before being tagged `interrupted` regardless of outcome.
    let handle_fut = handler.handle(handler_ctx);
    tokio::pin!(handle_fut);
    let outcome = tokio::select! {
        res = &mut handle_fut => res,
        _ = cancellation.cancelled() => {
            match tokio::time::timeout(cancellation_grace, &mut handle_fut).await {
                Ok(res) => res,
                Err(_) => Err(Error::timeout(cancellation_grace)),
            }
        }
    };

    match outcome {
        Ok(output) => {
            step.complete(output.clone());
            let step_id = step.id;
            let _ = store.save_step(step).await;
            let _ = store
                .append_log(ExecutionLog::new(execution.id, Some(step_id), LogLevel::Info, format!("node '{node_id}' completed")))
                .await;
            (node_id, Ok(output))
        }
        Err(err) => {
            let kind = if cancellation.is_cancelled() { "interrupted" } else { "handler_error" };
            step.fail(ExecutionError::new(kind, err.to_string()));
            let step_id = step.id;
            let _ = store.save_step(step).await;
            let _ = store
                .append_log(ExecutionLog::new(execution.id, Some(step_id), LogLevel::Error, format!("node '{node_id}' failed: {err}")))
                .await;
            (node_id, Err(err))
        }
    }
}

pub struct DagRunner {
    execution_store: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    max_parallel_fanout: usize,
    cancellation_grace: Duration,
    usage: Option<Arc<UsageMeter>>,
}

impl DagRunner {
    pub fn new(
        execution_store: Arc<dyn ExecutionStore>,
        registry: Arc<HandlerRegistry>,
        max_parallel_fanout: usize,
        cancellation_grace: Duration,
    ) -> Self {
        Self {
            execution_store,
            registry,
            max_parallel_fanout: max_parallel_fanout.max(1),
            cancellation_grace,
            usage: None,
        }
    }

    /// Wires in AI-token accounting (§4.5 `ai_*` side effect, §4.7 chargeable
    /// event): once set, every `ai_*` node's reported tokens are folded into
    /// `execution.metrics` and charged to the organization's `AiTokens`
    /// quota after the handler completes.
    pub fn with_usage_meter(mut self, usage: Arc<UsageMeter>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Runs `execution` (expected already `running`) against `workflow`'s
    /// current definition to completion or failure, persisting every step
    /// and the final execution transition. `cancellation` is signalled by
    /// the scheduler's `cancel_execution` (§5); every loop iteration also
    /// checks `execution.deadline` so a forgotten-but-running execution
    /// fails with a `timeout` kind rather than running forever. Returns the
    /// saved execution.
    pub async fn run(&self, workflow: &Workflow, mut execution: Execution, cancellation: CancellationToken) -> Result<Execution> {
        let expected_version = execution.version;
        let mut context = match build_initial_context(workflow, &execution) {
            Ok(c) => c,
            Err(e) => {
                // §4.5 point 2: a required variable missing neither a supplied
                // value nor a default fails the execution immediately, rather
                // than leaving it stuck `running` forever.
                execution.fail(ExecutionError::new("validation", e.to_string()))?;
                return self.execution_store.save_execution(execution, expected_version).await;
            }
        };

        let def = &workflow.definition;
        let node_by_id: HashMap<&str, &Node> = def.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut inbound: HashMap<&str, Vec<&Edge>> = HashMap::new();
        let mut outbound: HashMap<&str, Vec<&Edge>> = HashMap::new();
        for edge in &def.edges {
            inbound.entry(edge.target.as_str()).or_default().push(edge);
            outbound.entry(edge.source.as_str()).or_default().push(edge);
        }

        let mut in_degree: HashMap<&str, usize> = def
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), inbound.get(n.id.as_str()).map(|v| v.len()).unwrap_or(0)))
            .collect();

        let mut ready: VecDeque<&str> = def
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut step_statuses: HashMap<String, StepStatus> = HashMap::new();
        let mut node_outputs: HashMap<String, Value> = HashMap::new();
        let step_counter = AtomicU32::new(0);
        let mut execution_failure: Option<ExecutionError> = None;
        let mut execution_cancelled = false;

        'outer: while !ready.is_empty() {
            if cancellation.is_cancelled() {
                execution_cancelled = true;
                break 'outer;
            }
            if execution.is_past_deadline(Utc::now()) {
                execution_failure = Some(ExecutionError::new("timeout", "execution exceeded its deadline"));
                break 'outer;
            }

            let level: Vec<&str> = ready.drain(..).collect();
            let mut to_run: Vec<&str> = Vec::new();

            for &node_id in &level {
                let decision = match decide_node(node_id, &inbound, &step_statuses, &context) {
                    Ok(d) => d,
                    // A malformed edge condition is the same "immediate
                    // fail" case as a missing required variable: terminal,
                    // not a stuck `running` execution.
                    Err(e) => Decision::Fail(ExecutionError::new("validation", e.to_string())),
                };
                match decision {
                    Decision::Fail(err) => {
                        execution_failure = Some(err);
                    }
                    Decision::Skip => {
                        let step_number = step_counter.fetch_add(1, Ordering::SeqCst) + 1;
                        let node = node_by_id[node_id];
                        let mut step = ExecutionStep::new(execution.id, node.id.clone(), node.type_name.clone(), step_number, serde_json::json!(context));
                        step.skip();
                        self.execution_store.create_step(step).await?;
                        step_statuses.insert(node_id.to_string(), StepStatus::Skipped);
                        node_outputs.insert(node_id.to_string(), serde_json::json!({"status": "skipped"}));
                        context.insert(node_id.to_string(), serde_json::json!({"status": "skipped"}));
                    }
                    Decision::Run => to_run.push(node_id),
                }
            }

            if execution_failure.is_some() {
                break 'outer;
            }

            let semaphore = Arc::new(Semaphore::new(self.max_parallel_fanout));
            let mut handles = Vec::with_capacity(to_run.len());
            for node_id in &to_run {
                let node = node_by_id[node_id].clone();
                let step_number = step_counter.fetch_add(1, Ordering::SeqCst) + 1;
                let store = self.execution_store.clone();
                let registry = self.registry.clone();
                let context_snapshot = context.clone();
                let execution_ref = execution.clone();
                let node_cancellation = cancellation.clone();
                let grace = self.cancellation_grace;
                let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    run_single_node(store, registry, node, context_snapshot, execution_ref, step_number, node_cancellation, grace).await
                }));
            }

            for handle in handles {
                let (node_id, result) = match handle.await {
                    Ok(r) => r,
                    Err(join_err) => {
                        execution_failure = Some(ExecutionError::new("internal", format!("node task panicked: {join_err}")));
                        continue;
                    }
                };
                match result {
                    Ok(output) => {
                        if let Some((tokens, cost)) = ai_usage_from_output(node_by_id[node_id.as_str()], &output) {
                            execution.metrics.ai_tokens_used += tokens;
                            execution.metrics.ai_cost += cost;
                            if let Some(usage) = &self.usage {
                                if let Err(e) = usage.charge(execution.organization_id, ResourceKind::AiTokens, tokens, Some(execution.id)).await {
                                    tracing::warn!(error = %e, execution_id = %execution.id, node_id = %node_id, "failed to charge AI token usage");
                                }
                            }
                        }
                        step_statuses.insert(node_id.clone(), StepStatus::Completed);
                        let merged = with_status(output, "completed");
                        node_outputs.insert(node_id.clone(), merged.clone());
                        context.insert(node_id, merged);
                    }
                    Err(err) => {
                        step_statuses.insert(node_id.clone(), StepStatus::Failed);
                        let merged = serde_json::json!({"status": "failed", "error": err.to_string()});
                        node_outputs.insert(node_id.clone(), merged.clone());
                        context.insert(node_id.clone(), merged);
                        let is_leaf = outbound.get(node_id.as_str()).map(|v| v.is_empty()).unwrap_or(true);
                        if is_leaf {
                            execution_failure = Some(ExecutionError::new("node_failure", format!("node '{node_id}' failed: {err}")));
                        }
                    }
                }
            }

            if cancellation.is_cancelled() {
                execution_cancelled = true;
                break 'outer;
            }

            if execution_failure.is_some() {
                break 'outer;
            }

            for &node_id in &level {
                if let Some(outs) = outbound.get(node_id) {
                    for edge in outs {
                        if let Some(d) = in_degree.get_mut(edge.target.as_str()) {
                            *d -= 1;
                            if *d == 0 {
                                ready.push_back(edge.target.as_str());
                            }
                        }
                    }
                }
            }
        }

        if execution_cancelled {
            execution.cancel()?;
            return self.execution_store.save_execution(execution, expected_version).await;
        }

        if let Some(err) = execution_failure {
            execution.fail(err)?;
            return self.execution_store.save_execution(execution, expected_version).await;
        }

        execution.context = context;
        execution.complete(serde_json::json!(node_outputs))?;
        self.execution_store.save_execution(execution, expected_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{Edge as CoreEdge, GraphDefinition, Node as CoreNode, Workflow};
    use flowpilot_memory::InMemoryExecutionStore;
    use uuid::Uuid;

    fn node(id: &str, type_name: &str, config: Value) -> CoreNode {
        CoreNode { id: id.to_string(), name: None, type_name: type_name.to_string(), config }
    }

    fn edge(id: &str, source: &str, target: &str, condition: Option<&str>) -> CoreEdge {
        CoreEdge { id: id.to_string(), source: source.to_string(), target: target.to_string(), condition: condition.map(|s| s.to_string()) }
    }

    fn build_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register("variable", Arc::new(crate::handlers::variable::VariableHandler));
        registry.register("condition", Arc::new(crate::handlers::condition::ConditionHandler));
        registry.register("delay", Arc::new(crate::handlers::delay::DelayHandler));
        registry
    }

    #[tokio::test]
    async fn linear_workflow_completes() {
        let def = GraphDefinition {
            nodes: vec![
                node("a", "variable", serde_json::json!({"name": "x", "value": 1})),
                node("b", "variable", serde_json::json!({"name": "y", "value": 2})),
            ],
            edges: vec![edge("e1", "a", "b", None)],
        };
        let workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        let execution = Execution::submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None);

        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(build_registry());
        let runner = DagRunner::new(store, registry, 4, Duration::from_secs(5));

        let mut execution = execution;
        execution.start().unwrap();
        let finished = runner.run(&workflow, execution, CancellationToken::new()).await.unwrap();
        assert_eq!(finished.status, flowpilot_core::ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn edge_condition_false_skips_target() {
        let def = GraphDefinition {
            nodes: vec![
                node("a", "variable", serde_json::json!({"name": "x", "value": 1})),
                node("b", "variable", serde_json::json!({"name": "y", "value": 2})),
            ],
            edges: vec![edge("e1", "a", "b", Some("a.value == 999"))],
        };
        let workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        let mut execution = Execution::submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None);
        execution.start().unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(build_registry());
        let runner = DagRunner::new(store.clone(), registry, 4, Duration::from_secs(5));

        let finished = runner.run(&workflow, execution, CancellationToken::new()).await.unwrap();
        assert_eq!(finished.status, flowpilot_core::ExecutionStatus::Completed);
        let steps = store.list_steps(finished.id).await.unwrap();
        let b_step = steps.iter().find(|s| s.node_id == "b").unwrap();
        assert_eq!(b_step.status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn leaf_node_failure_fails_execution() {
        let def = GraphDefinition {
            nodes: vec![node("a", "condition", serde_json::json!({"expr": "missing.path"}))],
            edges: vec![],
        };
        // `missing.path` resolves to null, truthy check false, not an error -
        // use a handler type mismatch instead to force a real handler error.
        let def = GraphDefinition {
            nodes: vec![node("a", "unregistered_type", serde_json::json!({}))],
            edges: vec![],
        };
        let workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        let mut execution = Execution::submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None);
        execution.start().unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(build_registry());
        let runner = DagRunner::new(store, registry, 4, Duration::from_secs(5));

        let finished = runner.run(&workflow, execution, CancellationToken::new()).await.unwrap();
        assert_eq!(finished.status, flowpilot_core::ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn tolerant_edge_survives_upstream_failure() {
        let def = GraphDefinition {
            nodes: vec![
                node("a", "unregistered_type", serde_json::json!({})),
                node("b", "variable", serde_json::json!({"name": "recovered", "value": true})),
            ],
            edges: vec![edge("e1", "a", "b", Some("a.status == failed"))],
        };
        let workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        let mut execution = Execution::submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None);
        execution.start().unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(build_registry());
        let runner = DagRunner::new(store, registry, 4, Duration::from_secs(5));

        let finished = runner.run(&workflow, execution, CancellationToken::new()).await.unwrap();
        assert_eq!(finished.status, flowpilot_core::ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn cancelling_a_running_delay_marks_it_interrupted() {
        let def = GraphDefinition {
            nodes: vec![node("a", "delay", serde_json::json!({"seconds": 30}))],
            edges: vec![],
        };
        let workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        let mut execution = Execution::submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None);
        execution.start().unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(build_registry());
        let runner = DagRunner::new(store.clone(), registry, 4, Duration::from_secs(2));

        let cancellation = CancellationToken::new();
        let token = cancellation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let finished = runner.run(&workflow, execution, cancellation).await.unwrap();
        assert_eq!(finished.status, flowpilot_core::ExecutionStatus::Cancelled);

        let steps = store.list_steps(finished.id).await.unwrap();
        let a_step = steps.iter().find(|s| s.node_id == "a").unwrap();
        assert_eq!(a_step.status, StepStatus::Failed);
        assert_eq!(a_step.error.as_ref().unwrap().kind, "interrupted");
    }

    #[tokio::test]
    async fn missing_required_variable_fails_execution_instead_of_hanging() {
        let def = GraphDefinition {
            nodes: vec![node("a", "variable", serde_json::json!({"name": "y", "value": 1}))],
            edges: vec![],
        };
        let mut workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        workflow.variables.push(flowpilot_core::WorkflowVariable {
            name: "required_input".to_string(),
            var_type: flowpilot_core::VariableType::String,
            scope: flowpilot_core::VariableScope::Global,
            default_value: None,
            required: true,
            secret: false,
        });
        let mut execution = Execution::submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None);
        execution.start().unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let registry = Arc::new(build_registry());
        let runner = DagRunner::new(store, registry, 4, Duration::from_secs(5));

        let finished = runner.run(&workflow, execution, CancellationToken::new()).await.unwrap();
        assert_eq!(finished.status, flowpilot_core::ExecutionStatus::Failed);
        assert!(finished.completed_at.is_some());
        assert_eq!(finished.error.as_ref().unwrap().kind, "validation");
    }

    #[tokio::test]
    async fn ai_node_folds_tokens_into_metrics_and_charges_meter() {
        use crate::metering::UsageMeter;
        use flowpilot_ai::FakeAiClient;
        use flowpilot_memory::InMemoryCacheStore;
        use flowpilot_memory::InMemoryUsageStore;

        let def = GraphDefinition {
            nodes: vec![node(
                "a",
                "ai",
                serde_json::json!({"provider": "anthropic", "model": "claude-3", "prompt": "summarize this"}),
            )],
            edges: vec![],
        };
        let workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        let mut execution = Execution::submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None);
        execution.start().unwrap();

        let store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let mut registry = HandlerRegistry::new();
        let ai_client: Arc<dyn flowpilot_core::AiClient> = Arc::new(FakeAiClient::default());
        let cache: Arc<dyn flowpilot_core::CacheStore> = Arc::new(InMemoryCacheStore::new());
        registry.register("ai", Arc::new(crate::handlers::ai::AiHandler::new(ai_client, cache)));

        let usage_store = Arc::new(InMemoryUsageStore::new());
        let usage = Arc::new(UsageMeter::new(usage_store.clone()));
        let runner = DagRunner::new(store, Arc::new(registry), 4, Duration::from_secs(5)).with_usage_meter(usage);

        let finished = runner.run(&workflow, execution, CancellationToken::new()).await.unwrap();
        assert_eq!(finished.status, flowpilot_core::ExecutionStatus::Completed);
        assert!(finished.metrics.ai_tokens_used > 0);

        let events = usage_store.list_events(finished.organization_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].quantity, finished.metrics.ai_tokens_used);
    }
}
