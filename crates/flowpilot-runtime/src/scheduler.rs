//! Execution Scheduler & state machine (§4.4): a bounded work queue handing
//! pending executions to the [`DagRunner`](crate::runner::DagRunner), a
//! watchdog requeuing leases the Runner never returned from, and
//! non-overlapping-trigger concurrency enforcement.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use flowpilot_core::{
    CancellationToken, Error, Execution, ExecutionStatus, ExecutionStore, ResourceKind, Result,
    SchedulerConfig, Workflow, WorkflowStore, WorkflowTrigger,
};
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::gate::{PermissionGate, RouteClass};
use crate::runner::DagRunner;

/// Handle to submit executions to a running worker pool. Cheap to clone;
/// cloning shares the same bounded channel.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<Uuid>,
}

impl SchedulerHandle {
    /// Enqueues an already-created pending execution for a worker to pick
    /// up. Blocks briefly if the queue is full (back-pressure); callers on
    /// a synchronous request path should treat a slow `submit` as a signal
    /// to shed load upstream.
    pub async fn submit(&self, execution_id: Uuid) -> Result<()> {
        self.sender
            .send(execution_id)
            .await
            .map_err(|_| Error::internal("scheduler queue is closed"))
    }
}

pub struct ExecutionScheduler {
    workflow_store: Arc<dyn WorkflowStore>,
    execution_store: Arc<dyn ExecutionStore>,
    runner: Arc<DagRunner>,
    config: SchedulerConfig,
    gate: Arc<PermissionGate>,
    /// Cancellation signal for each execution currently being driven by
    /// this scheduler, keyed by execution id. Entries exist only while
    /// `drive` is actually running that execution; `cancel_execution`
    /// falls back to a direct store transition when no entry is found
    /// (the execution is still `pending`, not yet picked up by a worker).
    cancellations: DashMap<Uuid, CancellationToken>,
}

impl ExecutionScheduler {
    pub fn new(
        workflow_store: Arc<dyn WorkflowStore>,
        execution_store: Arc<dyn ExecutionStore>,
        runner: Arc<DagRunner>,
        config: SchedulerConfig,
        gate: Arc<PermissionGate>,
    ) -> Self {
        Self { workflow_store, execution_store, runner, config, gate, cancellations: DashMap::new() }
    }

    /// Creates a new `pending` execution, rejecting it up front if the
    /// workflow is not active (§8: "submitting to a workflow with
    /// active=false fails with Validation") or if its trigger is
    /// `non_overlapping` and already has one in flight.
    pub async fn submit(
        &self,
        organization_id: Uuid,
        workflow_id: Uuid,
        input: serde_json::Value,
        trigger: Option<&WorkflowTrigger>,
        principal_id: Option<Uuid>,
    ) -> Result<Execution> {
        let workflow = self.workflow_store.get_workflow(organization_id, workflow_id).await?;
        if !workflow.is_active {
            return Err(Error::validation(format!("workflow {workflow_id} is not active")));
        }
        if let Some(trigger) = trigger {
            if trigger.non_overlapping {
                let in_flight = self.execution_store.count_in_flight(workflow_id, Some(trigger.id)).await?;
                if in_flight > 0 {
                    return Err(Error::conflict(format!(
                        "trigger '{}' is non-overlapping and already has an execution in flight",
                        trigger.name
                    )));
                }
            }
        }

        let quota_class = RouteClass::Mutating { quota_kind: ResourceKind::Executions };
        self.gate.check_quota(organization_id, quota_class).await?;

        let execution = Execution::submit(organization_id, workflow_id, input, trigger.map(|t| t.id), principal_id);
        let execution = self.execution_store.create_execution(execution).await?;
        self.gate.charge_quota(organization_id, quota_class).await?;
        Ok(execution)
    }

    /// Signals the running execution's cancellation token if a worker has
    /// already picked it up; otherwise transitions the still-`pending` row
    /// directly (§5: cancelling before the Runner starts never races its
    /// final `save_execution`, since no token — and no Runner — exists yet).
    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<Execution> {
        if let Some(token) = self.cancellations.get(&execution_id) {
            token.cancel();
            return self.execution_store.get_execution(execution_id).await;
        }
        let mut execution = self.execution_store.get_execution(execution_id).await?;
        let expected_version = execution.version;
        execution.cancel()?;
        self.execution_store.save_execution(execution, expected_version).await
    }

    /// Runs one queued execution end to end: loads its workflow, transitions
    /// `pending -> running`, drives it through the [`DagRunner`], then folds
    /// the outcome into the workflow's stats.
    pub async fn drive(&self, execution_id: Uuid) -> Result<Execution> {
        let execution = self.execution_store.get_execution(execution_id).await?;
        let mut workflow = self.workflow_store.get_workflow(execution.organization_id, execution.workflow_id).await?;

        let expected_version = execution.version;
        let mut execution = execution;
        execution.start()?;
        let execution = self.execution_store.save_execution(execution, expected_version).await?;

        workflow.record_submission();
        let cancellation = CancellationToken::new();
        self.cancellations.insert(execution_id, cancellation.clone());
        let finished = self.runner.run(&workflow, execution, cancellation).await;
        self.cancellations.remove(&execution_id);
        let finished = finished?;

        match finished.status {
            ExecutionStatus::Completed => workflow.record_success(),
            ExecutionStatus::Failed => workflow.record_failure(),
            ExecutionStatus::Cancelled => workflow.record_failure(),
            _ => {}
        }
        self.workflow_store.save_workflow(workflow).await?;
        Ok(finished)
    }

    /// Spawns `scheduler.worker_count` background workers draining a
    /// `scheduler.queue_capacity`-bounded channel. Returns a handle callers
    /// use to submit work and the workers' join handles for shutdown.
    pub fn spawn_workers(self: Arc<Self>) -> (SchedulerHandle, Vec<tokio::task::JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let mut handles = Vec::with_capacity(self.config.worker_count.max(1));
        for _ in 0..self.config.worker_count.max(1) {
            let scheduler = self.clone();
            let rx = rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = rx.lock().await.recv().await;
                    match next {
                        Some(execution_id) => {
                            if let Err(err) = scheduler.drive(execution_id).await {
                                tracing::error!(error = %err, %execution_id, "execution drive failed");
                            }
                        }
                        None => break,
                    }
                }
            }));
        }
        (SchedulerHandle { sender: tx }, handles)
    }

    /// Finds executions stuck `pending` past their lease window and
    /// resubmits them (§4.4 at-least-once delivery).
    pub async fn requeue_expired(&self, handle: &SchedulerHandle) -> Result<u64> {
        let now = Utc::now();
        let lease_window = chrono::Duration::seconds(self.config.lease_window_secs as i64);
        let expired = self.execution_store.list_expired_leases(now, lease_window).await?;
        for execution in &expired {
            handle.submit(execution.id).await?;
        }
        Ok(expired.len() as u64)
    }

    /// Exponential backoff with jitter for a failed execution's next retry,
    /// based on `retry_backoff_base_secs`.
    pub fn retry_backoff(&self, retry_count: u32) -> std::time::Duration {
        let base = self.config.retry_backoff_base_secs.max(1);
        let exponential = base.saturating_mul(1u64 << retry_count.min(10));
        let jitter = rand::thread_rng().gen_range(0..=(exponential / 4).max(1));
        std::time::Duration::from_secs(exponential + jitter)
    }

    pub fn workflow_store(&self) -> &Arc<dyn WorkflowStore> {
        &self.workflow_store
    }

    pub fn execution_store(&self) -> &Arc<dyn ExecutionStore> {
        &self.execution_store
    }

    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }
}

/// Submits an execution and immediately drives it on the caller's task,
/// skipping the worker pool. Used by `flowpilotctl workflow run` and tests
/// where a synchronous result is wanted.
pub async fn run_inline(scheduler: &ExecutionScheduler, workflow: &Workflow, input: serde_json::Value) -> Result<Execution> {
    let execution = scheduler.submit(workflow.organization_id, workflow.id, input, None, None).await?;
    scheduler.drive(execution.id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering::UsageMeter;
    use crate::registry::HandlerRegistry;
    use flowpilot_core::{Edge, GraphDefinition, Node, WorkflowStatus};
    use flowpilot_memory::{
        InMemoryAuditStore, InMemoryExecutionStore, InMemoryTenancyStore, InMemoryUsageStore, InMemoryWorkflowStore,
    };

    fn node(id: &str, type_name: &str, config: serde_json::Value) -> Node {
        Node { id: id.to_string(), name: None, type_name: type_name.to_string(), config }
    }

    async fn build_scheduler() -> (Arc<ExecutionScheduler>, Workflow) {
        let def = GraphDefinition {
            nodes: vec![node("a", "variable", serde_json::json!({"name": "x", "value": 1}))],
            edges: Vec::<Edge>::new(),
        };
        let mut workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        workflow.set_status(WorkflowStatus::Active);
        let workflow_store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
        let workflow = workflow_store.create_workflow(workflow).await.unwrap();

        let execution_store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let mut registry = HandlerRegistry::new();
        registry.register("variable", Arc::new(crate::handlers::variable::VariableHandler));
        let runner = Arc::new(DagRunner::new(execution_store.clone(), Arc::new(registry), 4, std::time::Duration::from_secs(5)));

        let usage = Arc::new(UsageMeter::new(Arc::new(InMemoryUsageStore::new())));
        let gate = Arc::new(PermissionGate::new(Arc::new(InMemoryTenancyStore::new()), Arc::new(InMemoryAuditStore::new()), usage));

        let scheduler = Arc::new(ExecutionScheduler::new(workflow_store, execution_store, runner, SchedulerConfig::default(), gate));
        (scheduler, workflow)
    }

    #[tokio::test]
    async fn submit_and_drive_completes_and_updates_stats() {
        let (scheduler, workflow) = build_scheduler().await;
        let execution = scheduler.submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None).await.unwrap();
        let finished = scheduler.drive(execution.id).await.unwrap();
        assert_eq!(finished.status, ExecutionStatus::Completed);

        let saved = scheduler.workflow_store().get_workflow(workflow.organization_id, workflow.id).await.unwrap();
        assert_eq!(saved.stats.execution_count, 1);
        assert_eq!(saved.stats.success_count, 1);
    }

    #[tokio::test]
    async fn non_overlapping_trigger_rejects_second_submission() {
        let (scheduler, workflow) = build_scheduler().await;
        let mut trigger = WorkflowTrigger::new_manual(workflow.id, "t");
        trigger.non_overlapping = true;

        let first = scheduler
            .submit(workflow.organization_id, workflow.id, serde_json::json!({}), Some(&trigger), None)
            .await
            .unwrap();

        // First execution is still pending (never driven), so in-flight count is nonzero.
        let second = scheduler
            .submit(workflow.organization_id, workflow.id, serde_json::json!({}), Some(&trigger), None)
            .await;
        assert!(second.is_err());

        let _ = scheduler.drive(first.id).await.unwrap();
    }

    #[tokio::test]
    async fn submit_fails_closed_when_executions_quota_is_exhausted() {
        let def = GraphDefinition {
            nodes: vec![node("a", "variable", serde_json::json!({"name": "x", "value": 1}))],
            edges: Vec::<Edge>::new(),
        };
        let mut workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        workflow.set_status(WorkflowStatus::Active);
        let workflow_store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
        let workflow = workflow_store.create_workflow(workflow).await.unwrap();

        let execution_store: Arc<dyn ExecutionStore> = Arc::new(InMemoryExecutionStore::new());
        let mut registry = HandlerRegistry::new();
        registry.register("variable", Arc::new(crate::handlers::variable::VariableHandler));
        let runner = Arc::new(DagRunner::new(execution_store.clone(), Arc::new(registry), 4, std::time::Duration::from_secs(5)));

        let usage_store = Arc::new(InMemoryUsageStore::new());
        usage_store
            .get_or_create_quota(workflow.organization_id, flowpilot_core::ResourceKind::Executions, flowpilot_core::QuotaPeriod::Monthly, 0, true)
            .await
            .unwrap();
        let usage = Arc::new(UsageMeter::new(usage_store));
        let gate = Arc::new(PermissionGate::new(Arc::new(InMemoryTenancyStore::new()), Arc::new(InMemoryAuditStore::new()), usage));

        let scheduler = Arc::new(ExecutionScheduler::new(workflow_store.clone(), execution_store.clone(), runner, SchedulerConfig::default(), gate));

        let err = scheduler.submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None).await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { .. }));
        assert!(execution_store.list_executions_for_workflow(workflow.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn worker_pool_drains_submitted_execution() {
        let (scheduler, workflow) = build_scheduler().await;
        let (handle, workers) = scheduler.clone().spawn_workers();
        let execution = scheduler.submit(workflow.organization_id, workflow.id, serde_json::json!({}), None, None).await.unwrap();
        handle.submit(execution.id).await.unwrap();

        // Give the worker a chance to drain the channel.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let saved = scheduler.execution_store().get_execution(execution.id).await.unwrap();
        assert_eq!(saved.status, ExecutionStatus::Completed);

        for w in workers {
            w.abort();
        }
    }
}
