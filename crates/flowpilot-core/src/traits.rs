//! The trait seams Design Notes calls out in place of a global admin
//! registry / ORM: every store is an explicit trait, implemented in
//! `flowpilot-memory`; every external collaborator (§1, §6) is a narrow
//! async trait implemented in `flowpilot-ai`/`flowpilot-connectors`, with
//! in-memory fakes for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::cache::{AiRequest, SemanticCacheEntry};
use crate::error::Result;
use crate::execution::{Execution, ExecutionLog, ExecutionStep};
use crate::node::Node;
use crate::quota::{ResourceKind, UsageEvent, UsageQuota};
use crate::tenancy::{ApiKey, Invitation, Membership, Organization, Principal, Role};
use crate::workflow::{Workflow, WorkflowTrigger, WorkflowVersion};

/// Filter for `WorkflowStore::list_workflows` — the explicit query builder
/// Design Notes calls for in place of a filterable queryset.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFilter {
    pub status: Option<crate::workflow::WorkflowStatus>,
    pub tag: Option<String>,
    pub name_contains: Option<String>,
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow>;
    async fn get_workflow(&self, organization_id: Uuid, id: Uuid) -> Result<Workflow>;
    /// Unscoped lookup for internal dispatch paths (cron scanner, webhook
    /// and event triggers) that only ever hold a `workflow_id`, never the
    /// caller's organization — never expose this behind a tenant-facing API.
    async fn get_workflow_by_id(&self, id: Uuid) -> Result<Workflow>;
    async fn save_workflow(&self, workflow: Workflow) -> Result<Workflow>;
    async fn list_workflows(&self, organization_id: Uuid, filter: &WorkflowFilter) -> Result<Vec<Workflow>>;
    async fn delete_workflow(&self, organization_id: Uuid, id: Uuid) -> Result<()>;

    async fn save_version(&self, version: WorkflowVersion) -> Result<WorkflowVersion>;
    async fn get_version(&self, workflow_id: Uuid, version: u32) -> Result<WorkflowVersion>;
    async fn list_versions(&self, workflow_id: Uuid) -> Result<Vec<WorkflowVersion>>;
    async fn gc_versions(&self, workflow_id: Uuid, keep_most_recent: u32, current_version: u32) -> Result<u32>;

    async fn save_trigger(&self, trigger: WorkflowTrigger) -> Result<WorkflowTrigger>;
    async fn get_trigger(&self, id: Uuid) -> Result<WorkflowTrigger>;
    async fn list_triggers(&self, workflow_id: Uuid) -> Result<Vec<WorkflowTrigger>>;
    async fn list_active_scheduled_triggers(&self) -> Result<Vec<WorkflowTrigger>>;
    async fn find_trigger_by_webhook_path(&self, path: &str) -> Result<WorkflowTrigger>;
    /// Active `event`-kind triggers subscribed to `event_type`, for the
    /// Trigger Dispatcher's event-bus fan-out (§4.3).
    async fn list_active_event_triggers(&self, event_type: &str) -> Result<Vec<WorkflowTrigger>>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create_execution(&self, execution: Execution) -> Result<Execution>;
    async fn get_execution(&self, id: Uuid) -> Result<Execution>;
    /// Saves a transition, rejecting a stale `version` with a retryable
    /// `Conflict` (§5 optimistic-lock policy).
    async fn save_execution(&self, execution: Execution, expected_version: u64) -> Result<Execution>;
    async fn list_executions_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Execution>>;
    /// Executions still `pending` past their lease window, for the
    /// watchdog to requeue (§4.4 at-least-once guarantee).
    async fn list_expired_leases(&self, now: DateTime<Utc>, lease_window: chrono::Duration) -> Result<Vec<Execution>>;
    /// Count of non-terminal executions for a (workflow, trigger) pair, for
    /// non-overlapping trigger concurrency enforcement.
    async fn count_in_flight(&self, workflow_id: Uuid, trigger_id: Option<Uuid>) -> Result<u64>;

    async fn create_step(&self, step: ExecutionStep) -> Result<ExecutionStep>;
    async fn save_step(&self, step: ExecutionStep) -> Result<ExecutionStep>;
    async fn list_steps(&self, execution_id: Uuid) -> Result<Vec<ExecutionStep>>;

    async fn append_log(&self, log: ExecutionLog) -> Result<ExecutionLog>;
    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<ExecutionLog>>;
    async fn gc_logs(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, prompt_hash: &str, model: &str) -> Result<Option<SemanticCacheEntry>>;
    /// Upsert keyed by `(prompt_hash, model)`.
    async fn upsert(&self, entry: SemanticCacheEntry) -> Result<SemanticCacheEntry>;
    /// Atomically bumps `hit_count`/`last_hit_at` on an existing row.
    async fn record_hit(&self, prompt_hash: &str, model: &str, at: DateTime<Utc>) -> Result<SemanticCacheEntry>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn record_ai_request(&self, request: AiRequest) -> Result<AiRequest>;
    async fn list_ai_requests(&self, execution_id: Uuid) -> Result<Vec<AiRequest>>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get_or_create_quota(
        &self,
        organization_id: Uuid,
        resource_kind: ResourceKind,
        period: crate::quota::QuotaPeriod,
        default_limit: u64,
        default_enforced: bool,
    ) -> Result<UsageQuota>;
    async fn save_quota(&self, quota: UsageQuota) -> Result<UsageQuota>;
    async fn list_quotas(&self, organization_id: Uuid) -> Result<Vec<UsageQuota>>;
    async fn list_all_quotas(&self) -> Result<Vec<UsageQuota>>;

    async fn record_event(&self, event: UsageEvent) -> Result<UsageEvent>;
    async fn list_events(&self, organization_id: Uuid) -> Result<Vec<UsageEvent>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditLog) -> Result<AuditLog>;
    async fn list_for_org(&self, organization_id: Uuid) -> Result<Vec<AuditLog>>;
    async fn gc(&self, older_than: DateTime<Utc>) -> Result<u64>;
}

/// Tenancy directory: organizations, principals, roles, memberships, API
/// keys, invitations. Kept as one trait (rather than five) because the
/// Permission Gate resolves all of them together on every request.
#[async_trait]
pub trait TenancyStore: Send + Sync {
    async fn get_organization(&self, id: Uuid) -> Result<Organization>;
    async fn save_organization(&self, org: Organization) -> Result<Organization>;
    async fn get_organization_by_slug(&self, slug: &str) -> Result<Organization>;

    async fn get_principal(&self, id: Uuid) -> Result<Principal>;
    async fn get_principal_by_email(&self, email: &str) -> Result<Principal>;
    async fn save_principal(&self, principal: Principal) -> Result<Principal>;

    async fn get_role(&self, id: Uuid) -> Result<Role>;
    async fn save_role(&self, role: Role) -> Result<Role>;
    async fn list_roles(&self, organization_id: Uuid) -> Result<Vec<Role>>;

    async fn get_membership(&self, organization_id: Uuid, principal_id: Uuid) -> Result<Membership>;
    async fn save_membership(&self, membership: Membership) -> Result<Membership>;
    async fn list_memberships_for_principal(&self, principal_id: Uuid) -> Result<Vec<Membership>>;

    async fn save_invitation(&self, invitation: Invitation) -> Result<Invitation>;
    async fn get_invitation_by_token(&self, token: &str) -> Result<Invitation>;

    async fn save_api_key(&self, key: ApiKey) -> Result<ApiKey>;
    async fn get_api_key_by_prefix(&self, prefix: &str) -> Result<ApiKey>;
}

/// `(node, context, execution, step) -> output | error`, the Handler
/// Registry's contract (§4.5). Handlers read `context` freely but mutate
/// only through the returned output; the Runner is what merges it back.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(&self, ctx: HandlerContext<'_>) -> Result<serde_json::Value>;
}

/// Everything a handler needs, bundled so adding a field later doesn't
/// change every handler's signature.
///
/// `cancellation` is the execution's cooperative cancellation signal (§5):
/// a handler with its own internal suspension points (polling, chunked
/// upload) may `select!` against `cancellation.cancelled()` to return
/// early, but it is never required to — the Runner enforces the bounded
/// grace period regardless by racing the handler future itself.
pub struct HandlerContext<'a> {
    pub node: &'a Node,
    pub context: &'a std::collections::HashMap<String, serde_json::Value>,
    pub execution: &'a Execution,
    pub step: &'a ExecutionStep,
    pub cancellation: CancellationToken,
}

/// `AIClient.generate(prompt, model) -> (response, tokens, cost)`.
#[async_trait]
pub trait AiClient: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str, system_prompt: Option<&str>) -> Result<AiGeneration>;
}

#[derive(Debug, Clone)]
pub struct AiGeneration {
    pub response: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// `ConnectorClient.invoke(provider, action, creds, payload)`.
#[async_trait]
pub trait ConnectorClient: Send + Sync {
    async fn invoke(
        &self,
        provider: &str,
        action: &str,
        credential_ref: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// `Notifier.send(channel, to, body)`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: &str, to: &[String], subject: &str, body: &str) -> Result<()>;
}
