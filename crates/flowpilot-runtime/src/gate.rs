//! The Tenancy & Permission Gate (§4.1): authentication, organization
//! context resolution, authorization, and quota enforcement, all sitting in
//! front of every mutating request before it reaches the engine.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use flowpilot_core::{
    authorize, resolve_organization_context, ApiKey, AuditEventKind, AuditLog, AuditOutcome,
    AuditStore, Error, LoginAttemptWindow, Membership, ResourceKind, Result, Role, TenancyStore,
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::metering::UsageMeter;

/// A mutating route's quota classification (§4.1 point 4). Safe (read-only)
/// routes bypass quota entirely but still require an active membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Safe,
    Mutating { quota_kind: ResourceKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaHeaders {
    pub resource_kind: ResourceKind,
    pub used: u64,
    pub limit: u64,
}

pub enum AuthOutcome {
    Success { principal_id: Uuid },
    Failure { reason: String },
}

/// Explicit struct passed by `Arc` into every request-handling path, per
/// Design Notes (`HandlerRegistry`/`Scheduler`/`UsageMeter` shape) — not a
/// global middleware singleton.
pub struct PermissionGate {
    tenancy: Arc<dyn TenancyStore>,
    audit: Arc<dyn AuditStore>,
    usage: Arc<UsageMeter>,
    login_attempts: DashMap<(String, String), LoginAttemptWindow>,
    revoked_refresh_tokens: DashMap<String, ()>,
}

impl PermissionGate {
    pub fn new(tenancy: Arc<dyn TenancyStore>, audit: Arc<dyn AuditStore>, usage: Arc<UsageMeter>) -> Self {
        Self {
            tenancy,
            audit,
            usage,
            login_attempts: DashMap::new(),
            revoked_refresh_tokens: DashMap::new(),
        }
    }

    /// §4.1 point 1, bearer path: the token itself is validated by the
    /// caller (JWT signature/expiry is outside this crate's scope); this
    /// only checks the server-side revocation list, keyed by the refresh
    /// token's hash, never the plaintext.
    pub fn is_refresh_token_revoked(&self, refresh_token_hash: &str) -> bool {
        self.revoked_refresh_tokens.contains_key(refresh_token_hash)
    }

    pub fn revoke_refresh_token(&self, refresh_token_hash: &str) {
        self.revoked_refresh_tokens.insert(refresh_token_hash.to_string(), ());
    }

    /// §4.1 point 1, API-key path: opaque prefixed token, active-flag,
    /// not-expired, optional IP allowlist. The hash comparison is constant
    /// time; `key_hash` must already be the same hash function's output as
    /// stored.
    pub async fn authenticate_api_key(
        &self,
        prefix: &str,
        provided_key_hash: &str,
        from_ip: Option<&str>,
    ) -> Result<ApiKey> {
        let key = self.tenancy.get_api_key_by_prefix(prefix).await?;
        let matches: bool = key.key_hash.as_bytes().ct_eq(provided_key_hash.as_bytes()).into();
        if !matches {
            return Err(Error::authentication("api key does not match"));
        }
        if !key.is_usable(from_ip) {
            return Err(Error::authentication("api key is inactive, expired, or IP-restricted"));
        }
        Ok(key)
    }

    /// §4.1 point 2: explicit header/param wins, then session default, then
    /// the principal's first active membership. Validates the resolved
    /// organization has an active membership; callers that don't need org
    /// context (public/auth routes) never call this.
    pub async fn resolve_organization(
        &self,
        principal_id: Uuid,
        explicit: Option<Uuid>,
        session_default: Option<Uuid>,
    ) -> Result<Uuid> {
        let memberships = self.tenancy.list_memberships_for_principal(principal_id).await?;
        resolve_organization_context(explicit, session_default, &memberships)
    }

    /// §4.1 point 3: `membership.permission(module, action)`, custom
    /// overrides beating the role map. Writes a `PermissionDenied` audit
    /// entry on failure so §8 scenario 6 ("permission denial ... writes an
    /// AuditLog entry") holds without every call site remembering to log it.
    pub async fn authorize_action(
        &self,
        organization_id: Uuid,
        principal_id: Uuid,
        module: &str,
        action: &str,
    ) -> Result<(Membership, Role)> {
        let membership = self.tenancy.get_membership(organization_id, principal_id).await?;
        let role = self.tenancy.get_role(membership.role_id).await?;
        if !authorize(&membership, &role, module, action) {
            self.audit
                .append(
                    AuditLog::new(AuditEventKind::PermissionDenied, AuditOutcome::Failure)
                        .with_org(organization_id)
                        .with_principal(principal_id)
                        .with_details(serde_json::json!({"module": module, "action": action})),
                )
                .await?;
            return Err(Error::permission(module, action));
        }
        Ok((membership, role))
    }

    /// §4.1 point 4, pre-flight: fails before the mutating request reaches
    /// the engine if one more unit would exceed an enforced quota. Does NOT
    /// mutate the counter — that happens post-response via
    /// [`Self::charge_quota`].
    pub async fn check_quota(&self, organization_id: Uuid, class: RouteClass) -> Result<()> {
        let RouteClass::Mutating { quota_kind } = class else {
            return Ok(());
        };
        if !self.usage.has_headroom(organization_id, quota_kind, 1).await? {
            let quota = self.usage.quota(organization_id, quota_kind).await?;
            self.audit
                .append(
                    AuditLog::new(AuditEventKind::QuotaExceeded, AuditOutcome::Failure)
                        .with_org(organization_id)
                        .with_details(serde_json::json!({
                            "resource_kind": quota_kind.to_string(),
                            "limit": quota.limit,
                        })),
                )
                .await?;
            return Err(Error::quota_exceeded(quota_kind.to_string(), quota.current_usage, quota.limit));
        }
        Ok(())
    }

    /// Current usage/limit snapshot without charging anything, for echoing
    /// the mandated `X-Quota-{Resource}-{Used,Limit}` response headers (§6)
    /// from a request-handling path that already charged (or, for a safe
    /// method, never needed to charge) the quota itself.
    pub async fn quota_snapshot(&self, organization_id: Uuid, kind: ResourceKind) -> Result<QuotaHeaders> {
        let quota = self.usage.quota(organization_id, kind).await?;
        Ok(QuotaHeaders { resource_kind: kind, used: quota.current_usage, limit: quota.limit })
    }

    /// Post-response counter increment (§4.1 point 4: "On success,
    /// *post-response*, increment the counter"), returning the quota header
    /// pair the response should echo.
    pub async fn charge_quota(&self, organization_id: Uuid, class: RouteClass) -> Result<Option<QuotaHeaders>> {
        let RouteClass::Mutating { quota_kind } = class else {
            return Ok(None);
        };
        let quota = self.usage.charge(organization_id, quota_kind, 1, None).await?;
        Ok(Some(QuotaHeaders {
            resource_kind: quota_kind,
            used: quota.current_usage,
            limit: quota.limit,
        }))
    }

    /// §4.1 point 5: logs every auth outcome and tracks failed logins per
    /// (email, ip) over a sliding window, locking the account after
    /// [`flowpilot_core::audit::LOGIN_FAILURE_THRESHOLD`] consecutive
    /// failures (defaults carried forward from the original source: 5
    /// failures / 15 minutes / 15 minute lockout).
    pub fn record_login_outcome(&self, email: &str, ip: &str, success: bool) -> bool {
        let mut window = self
            .login_attempts
            .entry((email.to_string(), ip.to_string()))
            .or_default();
        if success {
            window.record_success();
            false
        } else {
            window.record_failure(Utc::now());
            window.is_locked(Utc::now())
        }
    }

    pub fn is_login_locked(&self, email: &str, ip: &str) -> bool {
        self.login_attempts
            .get(&(email.to_string(), ip.to_string()))
            .map(|w| w.is_locked(Utc::now()))
            .unwrap_or(false)
    }

    pub async fn log_auth_outcome(&self, outcome: AuthOutcome, ip: Option<String>, user_agent: Option<String>) -> Result<()> {
        let (event_kind, result, principal_id) = match outcome {
            AuthOutcome::Success { principal_id } => (AuditEventKind::AuthSuccess, AuditOutcome::Success, Some(principal_id)),
            AuthOutcome::Failure { reason } => {
                let mut log = AuditLog::new(AuditEventKind::AuthFailure, AuditOutcome::Failure)
                    .with_request_meta(ip.clone(), user_agent.clone())
                    .with_details(serde_json::json!({"reason": reason}));
                log.timestamp = Utc::now();
                self.audit.append(log).await?;
                return Ok(());
            }
        };
        let mut log = AuditLog::new(event_kind, result).with_request_meta(ip, user_agent);
        if let Some(pid) = principal_id {
            log = log.with_principal(pid);
        }
        self.audit.append(log).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{Organization, Principal, QuotaPeriod, RoleKind};
    use flowpilot_memory::{InMemoryAuditStore, InMemoryTenancyStore, InMemoryUsageStore};

    async fn seed_org_with_role(
        tenancy: &InMemoryTenancyStore,
    ) -> (Uuid, Uuid, Membership, Role) {
        let principal = Principal {
            id: Uuid::new_v4(),
            email: "owner@example.com".to_string(),
            password_hash: "x".to_string(),
            is_verified: true,
            is_mfa_enabled: false,
            is_active: true,
            created_at: Utc::now(),
        };
        tenancy.save_principal(principal.clone()).await.unwrap();
        let org = Organization::new("Acme", "acme", principal.id);
        tenancy.save_organization(org.clone()).await.unwrap();
        let role = Role::viewer(org.id);
        tenancy.save_role(role.clone()).await.unwrap();
        let membership = Membership {
            id: Uuid::new_v4(),
            organization_id: org.id,
            principal_id: principal.id,
            role_id: role.id,
            department_id: None,
            is_active: true,
            custom_permissions: Default::default(),
            joined_at: Utc::now(),
        };
        tenancy.save_membership(membership.clone()).await.unwrap();
        (org.id, principal.id, membership, role)
    }

    #[tokio::test]
    async fn viewer_cannot_create_workflows() {
        let tenancy = Arc::new(InMemoryTenancyStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let usage = Arc::new(UsageMeter::new(Arc::new(InMemoryUsageStore::new())));
        let gate = PermissionGate::new(tenancy.clone(), audit.clone(), usage);

        let (org_id, principal_id, _, _) = seed_org_with_role(&tenancy).await;
        let err = gate.authorize_action(org_id, principal_id, "workflows", "create").await.unwrap_err();
        assert!(matches!(err, Error::Permission { .. }));
        assert_eq!(audit.list_for_org(org_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn viewer_can_read_workflows() {
        let tenancy = Arc::new(InMemoryTenancyStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let usage = Arc::new(UsageMeter::new(Arc::new(InMemoryUsageStore::new())));
        let gate = PermissionGate::new(tenancy.clone(), audit, usage);

        let (org_id, principal_id, _, _) = seed_org_with_role(&tenancy).await;
        assert!(gate.authorize_action(org_id, principal_id, "workflows", "read").await.is_ok());
    }

    #[tokio::test]
    async fn quota_blocks_before_charge() {
        let tenancy = Arc::new(InMemoryTenancyStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let usage_store = Arc::new(InMemoryUsageStore::new());
        let org_id = Uuid::new_v4();
        let mut quota = usage_store
            .get_or_create_quota(org_id, ResourceKind::Executions, QuotaPeriod::Monthly, 1, true)
            .await
            .unwrap();
        quota.current_usage = 1;
        usage_store.save_quota(quota).await.unwrap();
        let usage = Arc::new(UsageMeter::new(usage_store));
        let gate = PermissionGate::new(tenancy, audit, usage);

        let err = gate
            .check_quota(org_id, RouteClass::Mutating { quota_kind: ResourceKind::Executions })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { .. }));
    }

    #[test]
    fn lockout_after_five_failures() {
        let tenancy = Arc::new(InMemoryTenancyStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());
        let usage = Arc::new(UsageMeter::new(Arc::new(InMemoryUsageStore::new())));
        let gate = PermissionGate::new(tenancy, audit, usage);
        let mut locked = false;
        for _ in 0..5 {
            locked = gate.record_login_outcome("a@b.com", "1.2.3.4", false);
        }
        assert!(locked);
        assert!(gate.is_login_locked("a@b.com", "1.2.3.4"));
    }
}
