//! Cron scanner (§4.3): polls `list_active_scheduled_triggers` on
//! `TriggerConfig::scan_interval_secs` and fires every trigger whose cron
//! expression matches the current minute in its configured timezone,
//! deduplicated so a slow tick or a scanner restart never double-fires the
//! same (trigger, minute).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use flowpilot_core::{AuditEventKind, AuditLog, AuditOutcome, WorkflowStore, WorkflowTrigger};
use uuid::Uuid;

use crate::dispatcher::TriggerDispatcher;

/// Drives one scan pass over all active `scheduled` triggers. Own the
/// dedup map across ticks; a fresh `CronScanner` forgets what it already
/// fired, which is fine since it only ever re-fires for a minute already
/// elapsed by the time a restart finishes.
pub struct CronScanner {
    dispatcher: Arc<TriggerDispatcher>,
    last_fired_minute: DashMap<Uuid, i64>,
}

impl CronScanner {
    pub fn new(dispatcher: Arc<TriggerDispatcher>) -> Self {
        Self { dispatcher, last_fired_minute: DashMap::new() }
    }

    /// Runs one scan: lists active scheduled triggers, fires each whose
    /// cron expression matches `now` and that hasn't already fired for this
    /// minute. Returns the number fired. A single trigger's failure (bad
    /// cron expression, workflow gone inactive) is logged and skipped
    /// rather than aborting the whole pass.
    pub async fn tick(&self, now: DateTime<Utc>) -> flowpilot_core::Result<u32> {
        let triggers = self.dispatcher.workflow_store().list_active_scheduled_triggers().await?;
        let mut fired = 0;
        for trigger in triggers {
            match self.maybe_fire(&trigger, now).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(error = %err, trigger_id = %trigger.id, "scheduled trigger scan failed");
                }
            }
        }
        Ok(fired)
    }

    async fn maybe_fire(&self, trigger: &WorkflowTrigger, now: DateTime<Utc>) -> flowpilot_core::Result<bool> {
        if !cron_matches_minute(trigger, now)? {
            return Ok(false);
        }
        let minute_bucket = now.timestamp() / 60;
        if self.last_fired_minute.get(&trigger.id).map(|v| *v == minute_bucket).unwrap_or(false) {
            return Ok(false);
        }
        self.last_fired_minute.insert(trigger.id, minute_bucket);

        match self.dispatcher.fire_trigger(trigger.clone(), serde_json::json!({})).await {
            Ok(_) => Ok(true),
            Err(err) => {
                self.dispatcher
                    .record_rejection(
                        AuditLog::new(AuditEventKind::TriggerRejected, AuditOutcome::Failure)
                            .with_details(serde_json::json!({"trigger_id": trigger.id, "reason": err.to_string()})),
                    )
                    .await;
                Err(err)
            }
        }
    }
}

/// Evaluates `trigger.cron` against `now` in `trigger.timezone` (defaulting
/// to UTC), matched down to minute resolution.
fn cron_matches_minute(trigger: &WorkflowTrigger, now: DateTime<Utc>) -> flowpilot_core::Result<bool> {
    let expr = trigger
        .cron
        .as_deref()
        .ok_or_else(|| flowpilot_core::Error::validation("scheduled trigger missing cron expression"))?;
    let schedule: cron::Schedule = expr
        .parse()
        .map_err(|e| flowpilot_core::Error::validation(format!("invalid cron expression: {e}")))?;

    let tz: Tz = trigger
        .timezone
        .as_deref()
        .unwrap_or("UTC")
        .parse()
        .map_err(|_| flowpilot_core::Error::validation(format!("unknown timezone '{:?}'", trigger.timezone)))?;
    let local_now = now.with_timezone(&tz);
    let window_start = local_now - chrono::Duration::seconds(local_now.timestamp() % 60);

    Ok(schedule
        .after(&(window_start - chrono::Duration::seconds(1)))
        .next()
        .map(|next| next <= local_now)
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{Edge, GraphDefinition, Node, Workflow, WorkflowStatus};
    use flowpilot_memory::{
        InMemoryAuditStore, InMemoryExecutionStore, InMemoryTenancyStore, InMemoryUsageStore, InMemoryWorkflowStore,
    };
    use flowpilot_runtime::{
        handlers::variable::VariableHandler, DagRunner, ExecutionScheduler, HandlerRegistry, PermissionGate, UsageMeter,
    };
    use std::sync::Arc as StdArc;

    fn node(id: &str) -> Node {
        Node { id: id.to_string(), name: None, type_name: "variable".to_string(), config: serde_json::json!({"name": "x", "value": 1}) }
    }

    async fn build_scanner() -> (CronScanner, Workflow) {
        let def = GraphDefinition { nodes: vec![node("a")], edges: Vec::<Edge>::new() };
        let mut workflow = Workflow::new(Uuid::new_v4(), "wf", def).unwrap();
        workflow.set_status(WorkflowStatus::Active);
        let workflow_store: StdArc<dyn WorkflowStore> = StdArc::new(InMemoryWorkflowStore::new());
        let workflow = workflow_store.create_workflow(workflow).await.unwrap();

        let execution_store: StdArc<dyn flowpilot_core::ExecutionStore> = StdArc::new(InMemoryExecutionStore::new());
        let mut registry = HandlerRegistry::new();
        registry.register("variable", StdArc::new(VariableHandler));
        let runner = StdArc::new(DagRunner::new(execution_store.clone(), StdArc::new(registry), 4, std::time::Duration::from_secs(5)));
        let usage = StdArc::new(UsageMeter::new(StdArc::new(InMemoryUsageStore::new())));
        let gate = StdArc::new(PermissionGate::new(StdArc::new(InMemoryTenancyStore::new()), StdArc::new(InMemoryAuditStore::new()), usage));
        let scheduler = StdArc::new(ExecutionScheduler::new(
            workflow_store.clone(),
            execution_store,
            runner,
            flowpilot_core::config::SchedulerConfig::default(),
            gate,
        ));
        let (handle, _workers) = scheduler.clone().spawn_workers();
        let audit_store: StdArc<dyn flowpilot_core::AuditStore> = StdArc::new(InMemoryAuditStore::new());
        let dispatcher = StdArc::new(TriggerDispatcher::new(scheduler, handle, workflow_store, audit_store));
        (CronScanner::new(dispatcher), workflow)
    }

    #[tokio::test]
    async fn matching_cron_fires_once_per_minute() {
        let (scanner, workflow) = build_scanner().await;
        let mut trigger = WorkflowTrigger::new_manual(workflow.id, "every-minute");
        trigger.kind = flowpilot_core::TriggerKind::Scheduled;
        trigger.cron = Some("* * * * * *".to_string());
        scanner.dispatcher.workflow_store().save_trigger(trigger).await.unwrap();

        let now = Utc::now();
        let first = scanner.tick(now).await.unwrap();
        let second = scanner.tick(now + chrono::Duration::seconds(5)).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0, "same minute bucket must not refire");
    }

    #[tokio::test]
    async fn non_matching_cron_does_not_fire() {
        let (scanner, workflow) = build_scanner().await;
        let mut trigger = WorkflowTrigger::new_manual(workflow.id, "never");
        trigger.kind = flowpilot_core::TriggerKind::Scheduled;
        trigger.cron = Some("0 0 0 1 1 * 2000".to_string());
        scanner.dispatcher.workflow_store().save_trigger(trigger).await.unwrap();

        let fired = scanner.tick(Utc::now()).await.unwrap();
        assert_eq!(fired, 0);
    }
}
