//! `AuditLog`, the security-event sub-stream, distinct from `ExecutionLog`
//! (§4.8). Append-only: the storage layer never exposes an update path for
//! either stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    AuthSuccess,
    AuthFailure,
    AccountLocked,
    ConnectionCreated,
    ConnectionUpdated,
    ConnectionDeleted,
    SessionRevoked,
    TokenRotated,
    PermissionDenied,
    QuotaExceeded,
    WebhookRejected,
    TriggerRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub principal_id: Option<Uuid>,
    pub event_kind: AuditEventKind,
    pub outcome: AuditOutcome,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(event_kind: AuditEventKind, outcome: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id: None,
            principal_id: None,
            event_kind,
            outcome,
            ip_address: None,
            user_agent: None,
            details: serde_json::json!({}),
            timestamp: Utc::now(),
        }
    }

    pub fn with_org(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_principal(mut self, principal_id: Uuid) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    pub fn with_request_meta(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Sliding-window failed-login tracker (§4.1 point 5, carried forward
/// concrete defaults from the original source's `sso/services.py`: 5
/// failures within 15 minutes locks the account for 15 minutes).
#[derive(Debug, Clone)]
pub struct LoginAttemptWindow {
    pub failures: Vec<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

pub const LOGIN_FAILURE_THRESHOLD: usize = 5;
pub const LOGIN_WINDOW_MINUTES: i64 = 15;
pub const LOGIN_LOCKOUT_MINUTES: i64 = 15;

impl Default for LoginAttemptWindow {
    fn default() -> Self {
        Self {
            failures: Vec::new(),
            locked_until: None,
        }
    }
}

impl LoginAttemptWindow {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| now < until).unwrap_or(false)
    }

    /// Records a failed attempt, pruning entries outside the sliding
    /// window, and locks the account if the threshold is reached within it.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        let window_start = now - chrono::Duration::minutes(LOGIN_WINDOW_MINUTES);
        self.failures.retain(|&t| t >= window_start);
        self.failures.push(now);
        if self.failures.len() >= LOGIN_FAILURE_THRESHOLD {
            self.locked_until = Some(now + chrono::Duration::minutes(LOGIN_LOCKOUT_MINUTES));
        }
    }

    pub fn record_success(&mut self) {
        self.failures.clear();
        self.locked_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lockout_after_threshold_within_window() {
        let mut w = LoginAttemptWindow::default();
        let base = Utc::now();
        for i in 0..LOGIN_FAILURE_THRESHOLD {
            w.record_failure(base + chrono::Duration::seconds(i as i64));
        }
        assert!(w.is_locked(base + chrono::Duration::seconds(10)));
    }

    #[test]
    fn failures_outside_window_are_pruned() {
        let mut w = LoginAttemptWindow::default();
        let base = Utc::now();
        w.record_failure(base);
        w.record_failure(base + chrono::Duration::minutes(20));
        assert_eq!(w.failures.len(), 1);
        assert!(!w.is_locked(base + chrono::Duration::minutes(20)));
    }

    #[test]
    fn success_clears_failures() {
        let mut w = LoginAttemptWindow::default();
        let base = Utc::now();
        w.record_failure(base);
        w.record_success();
        assert!(w.failures.is_empty());
        assert!(!w.is_locked(base));
    }
}
