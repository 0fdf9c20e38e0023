//! [`TriggerDispatcher`]: the single funnel `scheduled.rs`, `webhook.rs`,
//! `event.rs`, and manual API calls all push through, so `ExecutionScheduler`'s
//! non-overlapping-trigger and workflow-active checks apply the same way no
//! matter how the execution was started.

use std::sync::Arc;

use flowpilot_core::{AuditLog, AuditStore, Error, Execution, Result, WorkflowStore, WorkflowTrigger};
use flowpilot_runtime::{ExecutionScheduler, SchedulerHandle};
use uuid::Uuid;

pub struct TriggerDispatcher {
    scheduler: Arc<ExecutionScheduler>,
    handle: SchedulerHandle,
    workflow_store: Arc<dyn WorkflowStore>,
    audit_store: Arc<dyn AuditStore>,
}

impl TriggerDispatcher {
    pub fn new(
        scheduler: Arc<ExecutionScheduler>,
        handle: SchedulerHandle,
        workflow_store: Arc<dyn WorkflowStore>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self { scheduler, handle, workflow_store, audit_store }
    }

    pub fn workflow_store(&self) -> &Arc<dyn WorkflowStore> {
        &self.workflow_store
    }

    pub fn audit_store(&self) -> &Arc<dyn AuditStore> {
        &self.audit_store
    }

    /// Fires a direct, unsourced submission — no `WorkflowTrigger` row, used
    /// by the `POST /workflows/{id}/execute` route and `workflow run`.
    pub async fn fire_manual(
        &self,
        organization_id: Uuid,
        workflow_id: Uuid,
        input: serde_json::Value,
        principal_id: Option<Uuid>,
    ) -> Result<Execution> {
        let execution = self.scheduler.submit(organization_id, workflow_id, input, None, principal_id).await?;
        self.handle.submit(execution.id).await?;
        Ok(execution)
    }

    /// Fires a specific `WorkflowTrigger`, resolving its owning workflow's
    /// organization, bumping the trigger's `execution_count`/
    /// `last_triggered_at`, and handing the new execution to the worker pool.
    pub async fn fire_trigger(&self, mut trigger: WorkflowTrigger, input: serde_json::Value) -> Result<Execution> {
        let workflow = self.workflow_store.get_workflow_by_id(trigger.workflow_id).await?;
        let execution = self
            .scheduler
            .submit(workflow.organization_id, workflow.id, input, Some(&trigger), None)
            .await?;
        self.handle.submit(execution.id).await?;

        trigger.record_trigger(chrono::Utc::now());
        self.workflow_store.save_trigger(trigger).await?;
        Ok(execution)
    }

    /// Records a trigger rejection (failed webhook signature, non-overlap
    /// conflict, disabled workflow) to the audit stream without failing the
    /// caller if the audit write itself errors.
    pub async fn record_rejection(&self, entry: AuditLog) {
        if let Err(err) = self.audit_store.append(entry).await {
            tracing::warn!(error = %err, "failed to record trigger rejection to audit log");
        }
    }
}

/// Maps a scheduler/workflow-store error surfaced while firing a trigger
/// into the shape callers expect: `NotFound`/`Validation` pass through,
/// anything else is wrapped as internal so a transient store failure never
/// looks like a malformed request.
pub fn wrap_dispatch_error(err: Error) -> Error {
    match err {
        Error::NotFound(_) | Error::Validation(_) | Error::Conflict(_) => err,
        other => Error::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{Edge, GraphDefinition, Node, Workflow, WorkflowStatus};
    use flowpilot_memory::{
        InMemoryAuditStore, InMemoryExecutionStore, InMemoryTenancyStore, InMemoryUsageStore, InMemoryWorkflowStore,
    };
    use flowpilot_runtime::{
        handlers::variable::VariableHandler, DagRunner, HandlerRegistry, PermissionGate, UsageMeter,
    };

    fn node(id: &str) -> Node {
        Node { id: id.to_string(), name: None, type_name: "variable".to_string(), config: serde_json::json!({"name": "x", "value": 1}) }
    }

    async fn build_dispatcher() -> (TriggerDispatcher, Workflow) {
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
        let audit_store: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());
        (TriggerDispatcher::new(scheduler, handle, workflow_store, audit_store), workflow)
    }

    #[tokio::test]
    async fn fire_manual_enqueues_execution() {
        let (dispatcher, workflow) = build_dispatcher().await;
        let execution = dispatcher
            .fire_manual(workflow.organization_id, workflow.id, serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(execution.workflow_id, workflow.id);
    }

    #[tokio::test]
    async fn fire_trigger_resolves_org_and_bumps_counters() {
        let (dispatcher, workflow) = build_dispatcher().await;
        let trigger = WorkflowTrigger::new_manual(workflow.id, "manual-fire");
        let trigger = dispatcher.workflow_store().save_trigger(trigger).await.unwrap();

        dispatcher.fire_trigger(trigger.clone(), serde_json::json!({})).await.unwrap();

        let saved = dispatcher.workflow_store().get_trigger(trigger.id).await.unwrap();
        assert_eq!(saved.execution_count, 1);
        assert!(saved.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn fire_manual_against_inactive_workflow_is_rejected() {
        let (dispatcher, workflow) = build_dispatcher().await;
        let mut inactive = dispatcher.workflow_store().get_workflow(workflow.organization_id, workflow.id).await.unwrap();
        inactive.is_active = false;
        dispatcher.workflow_store().save_workflow(inactive).await.unwrap();

        let result = dispatcher.fire_manual(workflow.organization_id, workflow.id, serde_json::json!({}), None).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
