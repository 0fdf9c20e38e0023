//! Internal event-bus dispatch (§4.3): something inside the engine (a node
//! handler, a webhook handler, a CLI command) publishes an `event_type` and
//! every active `event`-kind trigger subscribed to it fires, each getting
//! its own execution. No external broker — this is in-process fan-out over
//! `list_active_event_triggers`.

use std::sync::Arc;

use flowpilot_core::Result;
use uuid::Uuid;

use crate::dispatcher::TriggerDispatcher;

/// Publishes `event_type` with `payload`, firing every active event trigger
/// subscribed to it whose `event_filter` (if any) the payload satisfies.
/// Returns the ids of the executions it started; a single trigger's
/// failure to fire is logged and does not stop the others from firing.
pub async fn publish_event(
    dispatcher: Arc<TriggerDispatcher>,
    event_type: &str,
    payload: serde_json::Value,
) -> Result<Vec<Uuid>> {
    let triggers = dispatcher.workflow_store().list_active_event_triggers(event_type).await?;
    let mut started = Vec::with_capacity(triggers.len());
    for trigger in triggers {
        if !event_matches_filter(&trigger.event_filter, &payload) {
            continue;
        }
        match dispatcher.fire_trigger(trigger.clone(), payload.clone()).await {
            Ok(execution) => started.push(execution.id),
            Err(err) => {
                tracing::warn!(error = %err, trigger_id = %trigger.id, %event_type, "event trigger failed to fire");
            }
        }
    }
    Ok(started)
}

/// A trigger's `event_filter` is an object of `key: expected_value` pairs
/// that must all be present and equal in the published payload; `None`
/// matches everything. Deliberately shallow (no nested-path or operator
/// syntax) — the same flat-equality shape `authorize_action`'s custom
/// permission overrides use elsewhere in this workspace.
fn event_matches_filter(filter: &Option<serde_json::Value>, payload: &serde_json::Value) -> bool {
    let Some(filter) = filter else { return true };
    let Some(filter_obj) = filter.as_object() else { return true };
    let Some(payload_obj) = payload.as_object() else { return filter_obj.is_empty() };
    filter_obj.iter().all(|(k, v)| payload_obj.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{Edge, GraphDefinition, Node, TriggerKind, Workflow, WorkflowStatus, WorkflowStore, WorkflowTrigger};
    use flowpilot_memory::{
        InMemoryAuditStore, InMemoryExecutionStore, InMemoryTenancyStore, InMemoryUsageStore, InMemoryWorkflowStore,
    };
    use flowpilot_runtime::{
        handlers::variable::VariableHandler, DagRunner, ExecutionScheduler, HandlerRegistry, PermissionGate, UsageMeter,
    };

    fn node(id: &str) -> Node {
        Node { id: id.to_string(), name: None, type_name: "variable".to_string(), config: serde_json::json!({"name": "x", "value": 1}) }
    }

    async fn build_dispatcher() -> (Arc<TriggerDispatcher>, Workflow) {
        let def = GraphDefinition { nodes: vec![node("a")], edges: Vec::<Edge>::new() };
        let mut workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        workflow.set_status(WorkflowStatus::Active);
        let workflow_store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
        let workflow = workflow_store.create_workflow(workflow).await.unwrap();

        let execution_store: Arc<dyn flowpilot_core::ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let mut registry = HandlerRegistry::new();
        registry.register("variable", Arc::new(VariableHandler));
        let runner = Arc::new(DagRunner::new(execution_store.clone(), Arc::new(registry), 4, std::time::Duration::from_secs(5)));
        let usage = Arc::new(UsageMeter::new(Arc::new(InMemoryUsageStore::new())));
        let gate = Arc::new(PermissionGate::new(Arc::new(InMemoryTenancyStore::new()), Arc::new(InMemoryAuditStore::new()), usage));
        let scheduler = Arc::new(ExecutionScheduler::new(
            workflow_store.clone(),
            execution_store,
            runner,
            flowpilot_core::config::SchedulerConfig::default(),
            gate,
        ));
        let (handle, _workers) = scheduler.clone().spawn_workers();
        let audit_store: Arc<dyn flowpilot_core::AuditStore> = Arc::new(InMemoryAuditStore::new());
        (Arc::new(TriggerDispatcher::new(scheduler, handle, workflow_store, audit_store)), workflow)
    }

    #[tokio::test]
    async fn publish_fires_only_matching_event_type_and_filter() {
        let (dispatcher, workflow) = build_dispatcher().await;

        let mut matching = WorkflowTrigger::new_manual(workflow.id, "on-upload");
        matching.kind = TriggerKind::Event;
        matching.event_type = Some("document.uploaded".into());
        matching.event_filter = Some(serde_json::json!({"kind": "invoice"}));
        dispatcher.workflow_store().save_trigger(matching).await.unwrap();

        let mut other_kind = WorkflowTrigger::new_manual(workflow.id, "on-upload-other");
        other_kind.kind = TriggerKind::Event;
        other_kind.event_type = Some("document.uploaded".into());
        other_kind.event_filter = Some(serde_json::json!({"kind": "receipt"}));
        dispatcher.workflow_store().save_trigger(other_kind).await.unwrap();

        let started = publish_event(dispatcher, "document.uploaded", serde_json::json!({"kind": "invoice"})).await.unwrap();
        assert_eq!(started.len(), 1);
    }

    #[tokio::test]
    async fn publish_ignores_unrelated_event_type() {
        let (dispatcher, workflow) = build_dispatcher().await;
        let mut trigger = WorkflowTrigger::new_manual(workflow.id, "on-delete");
        trigger.kind = TriggerKind::Event;
        trigger.event_type = Some("document.deleted".into());
        dispatcher.workflow_store().save_trigger(trigger).await.unwrap();

        let started = publish_event(dispatcher, "document.uploaded", serde_json::json!({})).await.unwrap();
        assert!(started.is_empty());
    }
}
