//! Assembles the file-backed store set and the handler/scheduler machinery
//! every subcommand needs, the way `flowpilot-runtime`'s own tests wire an
//! `ExecutionScheduler` together but pointed at a persistent data directory
//! instead of an in-memory fake.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flowpilot_ai::FakeAiClient;
use flowpilot_connectors::{FakeConnectorClient, FakeNotifier};
use flowpilot_core::{AuditStore, CacheStore, EngineConfig, ExecutionStore, TenancyStore, UsageStore, WorkflowStore};
use flowpilot_memory::{FileAuditStore, FileCacheStore, FileExecutionStore, FileTenancyStore, FileUsageStore, FileWorkflowStore};
use flowpilot_runtime::handlers::register_default_handlers;
use flowpilot_runtime::{DagRunner, ExecutionScheduler, HandlerRegistry, PermissionGate, SchedulerHandle, UsageMeter};
use flowpilot_triggers::TriggerDispatcher;

/// One JSON snapshot file per store, all rooted under a single data
/// directory so `flowpilotctl serve --data-dir ./data` and `flowpilotctl
/// workflow run --data-dir ./data` see the same state. `gate` is built from
/// `usage`/`audit`/`tenancy` and is the single Permission Gate instance
/// every request-handling path (§4.1) shares.
pub struct EngineStores {
    pub workflow: Arc<dyn WorkflowStore>,
    pub execution: Arc<dyn ExecutionStore>,
    pub cache: Arc<dyn CacheStore>,
    pub usage: Arc<dyn UsageStore>,
    pub audit: Arc<dyn AuditStore>,
    pub tenancy: Arc<dyn TenancyStore>,
    pub gate: Arc<PermissionGate>,
    /// Shared with the `DagRunner` so `ai_*` steps charge the same
    /// `AiTokens` quota the Gate enforces on mutating routes (§4.7).
    pub usage_meter: Arc<UsageMeter>,
}

impl EngineStores {
    pub async fn open(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        let usage: Arc<dyn UsageStore> = Arc::new(FileUsageStore::new(data_dir.join("usage.json")).await?);
        let audit: Arc<dyn AuditStore> = Arc::new(FileAuditStore::new(data_dir.join("audit.json")).await?);
        let tenancy: Arc<dyn TenancyStore> = Arc::new(FileTenancyStore::new(data_dir.join("tenancy.json")).await?);
        let usage_meter = Arc::new(UsageMeter::new(usage.clone()));
        let gate = Arc::new(PermissionGate::new(tenancy.clone(), audit.clone(), usage_meter.clone()));
        Ok(Self {
            workflow: Arc::new(FileWorkflowStore::new(data_dir.join("workflows.json")).await?),
            execution: Arc::new(FileExecutionStore::new(data_dir.join("executions.json")).await?),
            cache: Arc::new(FileCacheStore::new(data_dir.join("cache.json")).await?),
            usage,
            audit,
            tenancy,
            gate,
            usage_meter,
        })
    }
}

/// Built-in handlers wired to fakes for `ai`/`connector`/`email`: this CLI
/// has no inbound credential store to decrypt real provider keys from, so
/// the handlers it drives are the same deterministic fakes the engine's own
/// tests use. A deployment with real providers builds its own registry with
/// `HttpAiClient`/`HttpConnectorClient` instead of calling this.
pub fn build_registry(cache: Arc<dyn CacheStore>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_default_handlers(
        &mut registry,
        Arc::new(FakeAiClient::new()),
        cache,
        Arc::new(FakeConnectorClient::new()),
        Arc::new(FakeNotifier::new()),
        reqwest::Client::new(),
    );
    registry
}

/// Builds the scheduler without spawning its worker pool, for one-shot
/// callers (`workflow run`) that drive a single execution inline via
/// [`flowpilot_runtime::scheduler::run_inline`] rather than a channel.
pub fn build_scheduler_only(stores: &EngineStores, config: &EngineConfig) -> Arc<ExecutionScheduler> {
    let registry = Arc::new(build_registry(stores.cache.clone()));
    let cancellation_grace = std::time::Duration::from_secs(config.runner.cancellation_grace_secs);
    let runner = Arc::new(
        DagRunner::new(stores.execution.clone(), registry, config.runner.max_parallel_fanout, cancellation_grace)
            .with_usage_meter(stores.usage_meter.clone()),
    );
    Arc::new(ExecutionScheduler::new(
        stores.workflow.clone(),
        stores.execution.clone(),
        runner,
        config.scheduler.clone(),
        stores.gate.clone(),
    ))
}

pub fn build_scheduler(
    stores: &EngineStores,
    config: &EngineConfig,
) -> (Arc<ExecutionScheduler>, SchedulerHandle, Vec<tokio::task::JoinHandle<()>>) {
    let scheduler = build_scheduler_only(stores, config);
    let (handle, workers) = scheduler.clone().spawn_workers();
    (scheduler, handle, workers)
}

pub fn build_dispatcher(stores: &EngineStores, scheduler: Arc<ExecutionScheduler>, handle: SchedulerHandle) -> Arc<TriggerDispatcher> {
    Arc::new(TriggerDispatcher::new(scheduler, handle, stores.workflow.clone(), stores.audit.clone()))
}

/// Loads `EngineConfig` from `path` if given, falling back to defaults
/// overlaid with environment variables, per `EngineConfig::from_env`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let base = match path {
        Some(p) => EngineConfig::from_file(p)?,
        None => EngineConfig::default(),
    };
    Ok(base.from_env())
}
