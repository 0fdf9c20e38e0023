//! Usage Metering (§4.7): atomic per-(organization, resource-kind) counters
//! backed by `UsageStore`, plus the append-only `UsageEvent` ledger written
//! alongside every chargeable event. `UsageQuota` is the enforcement source
//! of truth; the ledger is never consulted for enforcement (Open Question 3
//! in the spec, resolved in `SPEC_FULL.md`).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use flowpilot_core::{QuotaPeriod, ResourceKind, Result, UsageEvent, UsageQuota, UsageStore};
use uuid::Uuid;

/// Per-resource-kind unit cost, looked up on every chargeable event to
/// compute the ledger row's `total_cost`.
#[derive(Debug, Clone)]
pub struct PricingTable(HashMap<ResourceKind, f64>);

impl Default for PricingTable {
    fn default() -> Self {
        let mut table = HashMap::new();
        table.insert(ResourceKind::Executions, 0.0);
        table.insert(ResourceKind::ApiCalls, 0.0001);
        table.insert(ResourceKind::AiTokens, 0.00002);
        table.insert(ResourceKind::Documents, 0.01);
        table.insert(ResourceKind::Storage, 0.0000001);
        table.insert(ResourceKind::Members, 0.0);
        table.insert(ResourceKind::Workflows, 0.0);
        Self(table)
    }
}

impl PricingTable {
    pub fn unit_cost(&self, kind: ResourceKind) -> f64 {
        self.0.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, kind: ResourceKind, cost: f64) {
        self.0.insert(kind, cost);
    }
}

/// Default monthly ceiling used the first time a quota row is needed for a
/// (organization, resource-kind) pair that hasn't been explicitly
/// provisioned. Organizations that need a different limit save their own
/// `UsageQuota` through the same store; this is only ever a fallback.
fn default_limit(kind: ResourceKind) -> u64 {
    match kind {
        ResourceKind::Executions => 1_000,
        ResourceKind::ApiCalls => 100_000,
        ResourceKind::AiTokens => 1_000_000,
        ResourceKind::Documents => 1_000,
        ResourceKind::Storage => u64::MAX,
        ResourceKind::Members => 100,
        ResourceKind::Workflows => 100,
    }
}

/// The explicit struct Design Notes calls for in place of a global metering
/// singleton: passed by `Arc` into the Permission Gate and the DAG Runner.
pub struct UsageMeter {
    store: Arc<dyn UsageStore>,
    pricing: PricingTable,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self {
            store,
            pricing: PricingTable::default(),
        }
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Reads the current quota without charging anything, provisioning a
    /// default-limit row the first time this (organization, kind) pair is
    /// seen.
    pub async fn quota(&self, organization_id: Uuid, kind: ResourceKind) -> Result<UsageQuota> {
        self.store
            .get_or_create_quota(organization_id, kind, QuotaPeriod::Monthly, default_limit(kind), true)
            .await
    }

    /// `current + additional > limit && enforced` check without mutating
    /// anything — the Gate's pre-flight quota check (§4.1 point 4), which
    /// must fail *before* the mutating request reaches the engine.
    pub async fn has_headroom(&self, organization_id: Uuid, kind: ResourceKind, additional: u64) -> Result<bool> {
        let quota = self.quota(organization_id, kind).await?;
        Ok(quota.has_headroom(additional))
    }

    /// Atomically increments the quota counter and appends a `UsageEvent`.
    /// Fails with `QuotaExceeded` rather than ever producing
    /// `current_usage > limit` on an enforced quota (§5 shared-resource
    /// policy); the counter is left unchanged on failure.
    pub async fn charge(
        &self,
        organization_id: Uuid,
        kind: ResourceKind,
        quantity: u64,
        resource_id: Option<Uuid>,
    ) -> Result<UsageQuota> {
        let mut quota = self.quota(organization_id, kind).await?;
        let now = Utc::now();
        quota.maybe_reset(now);
        let crossed = quota.increment(quantity)?;
        let saved = self.store.save_quota(quota).await?;

        let period_end = saved
            .period
            .duration()
            .map(|d| saved.period_start + d)
            .unwrap_or_else(|| saved.period_start + chrono::Duration::days(3650));
        let event = UsageEvent::new(
            organization_id,
            kind,
            quantity,
            self.pricing.unit_cost(kind),
            resource_id,
            saved.period_start,
            period_end,
        );
        self.store.record_event(event).await?;

        for threshold in crossed {
            tracing::warn!(
                organization_id = %organization_id,
                resource_kind = %kind,
                current = saved.current_usage,
                limit = saved.limit,
                threshold,
                "usage quota threshold crossed"
            );
        }
        Ok(saved)
    }

    /// Periodic sweep (§4.7 counter reset): resets every quota whose period
    /// has elapsed since `last_reset_at`. `Total` quotas are never touched.
    pub async fn reset_elapsed(&self) -> Result<u64> {
        let now = Utc::now();
        let mut reset_count = 0u64;
        for mut quota in self.store.list_all_quotas().await? {
            if quota.maybe_reset(now) {
                self.store.save_quota(quota).await?;
                reset_count += 1;
            }
        }
        Ok(reset_count)
    }
}
