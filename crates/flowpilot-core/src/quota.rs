//! Usage quotas (enforcement) and usage events (the append-only ledger).
//!
//! `UsageQuota` is the enforcement source of truth; `UsageEvent` is the
//! ledger row recorded alongside every chargeable event, matching the
//! `UsageQuota`/`BillingUsage` split in the system this was distilled from
//! (Open Question 3 in the original spec, resolved: enforcement reads only
//! `UsageQuota`, never the ledger).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Workflows,
    Executions,
    ApiCalls,
    Storage,
    Members,
    AiTokens,
    Documents,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Workflows => "workflows",
            ResourceKind::Executions => "executions",
            ResourceKind::ApiCalls => "api_calls",
            ResourceKind::Storage => "storage",
            ResourceKind::Members => "members",
            ResourceKind::AiTokens => "ai_tokens",
            ResourceKind::Documents => "documents",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Total,
}

impl QuotaPeriod {
    /// How long this period lasts before its counter resets; `None` for
    /// `Total`, which never resets.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match self {
            QuotaPeriod::Daily => Some(chrono::Duration::hours(24)),
            QuotaPeriod::Weekly => Some(chrono::Duration::days(7)),
            QuotaPeriod::Monthly => Some(chrono::Duration::days(30)),
            QuotaPeriod::Yearly => Some(chrono::Duration::days(365)),
            QuotaPeriod::Total => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageQuota {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub resource_kind: ResourceKind,
    pub period: QuotaPeriod,
    pub limit: u64,
    pub current_usage: u64,
    /// Percentage (0-100) at which a warning notification fires.
    pub warning_threshold: u8,
    /// Percentage (0-100) at which an alert notification fires.
    pub alert_threshold: u8,
    pub is_enforced: bool,
    pub period_start: DateTime<Utc>,
    pub last_reset_at: DateTime<Utc>,
    /// Thresholds already notified this period, so alerts fire once each.
    pub notified_thresholds: Vec<u8>,
}

impl UsageQuota {
    pub fn new(
        organization_id: Uuid,
        resource_kind: ResourceKind,
        period: QuotaPeriod,
        limit: u64,
        is_enforced: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            resource_kind,
            period,
            limit,
            current_usage: 0,
            warning_threshold: 80,
            alert_threshold: 95,
            is_enforced,
            period_start: now,
            last_reset_at: now,
            notified_thresholds: Vec::new(),
        }
    }

    /// Returns `true` if one more unit would stay within the limit (or the
    /// quota is not enforced).
    pub fn has_headroom(&self, additional: u64) -> bool {
        !self.is_enforced || self.current_usage + additional <= self.limit
    }

    /// Atomically (from the caller's point of view — this takes `&mut self`
    /// behind whatever lock the store uses) increments usage, failing
    /// instead of ever producing `current_usage > limit` on an enforced
    /// quota. Returns threshold crossings newly reached this call, for the
    /// caller to turn into alert notifications.
    pub fn increment(&mut self, amount: u64) -> Result<Vec<&'static str>> {
        if self.is_enforced && self.current_usage + amount > self.limit {
            return Err(Error::quota_exceeded(
                self.resource_kind.to_string(),
                self.current_usage,
                self.limit,
            ));
        }
        self.current_usage += amount;
        Ok(self.check_thresholds())
    }

    fn check_thresholds(&mut self) -> Vec<&'static str> {
        if self.limit == 0 {
            return Vec::new();
        }
        let pct = (self.current_usage as f64 / self.limit as f64 * 100.0) as u8;
        let mut crossed = Vec::new();
        if pct >= self.alert_threshold && !self.notified_thresholds.contains(&self.alert_threshold)
        {
            self.notified_thresholds.push(self.alert_threshold);
            crossed.push("alert");
        } else if pct >= self.warning_threshold
            && !self.notified_thresholds.contains(&self.warning_threshold)
        {
            self.notified_thresholds.push(self.warning_threshold);
            crossed.push("warning");
        }
        crossed
    }

    /// Resets the counter if the period has elapsed since the last reset.
    /// `Total` never resets.
    pub fn maybe_reset(&mut self, now: DateTime<Utc>) -> bool {
        let Some(duration) = self.period.duration() else {
            return false;
        };
        if now - self.last_reset_at >= duration {
            self.current_usage = 0;
            self.last_reset_at = now;
            self.period_start = now;
            self.notified_thresholds.clear();
            true
        } else {
            false
        }
    }
}

/// Append-only ledger row, written alongside every chargeable event.
/// Never consulted for enforcement decisions — see module docs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub resource_kind: ResourceKind,
    pub quantity: u64,
    pub unit_cost: f64,
    pub total_cost: f64,
    pub resource_id: Option<Uuid>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(
        organization_id: Uuid,
        resource_kind: ResourceKind,
        quantity: u64,
        unit_cost: f64,
        resource_id: Option<Uuid>,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            resource_kind,
            quantity,
            unit_cost,
            total_cost: quantity as f64 * unit_cost,
            resource_id,
            period_start,
            period_end,
            recorded_at: Utc::now(),
        }
    }
}
