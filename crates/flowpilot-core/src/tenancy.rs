//! Organizations, principals, roles, memberships and the permission check
//! that sits in front of every mutating route.
//!
//! Grounded in `organizations/models.py` and `organizations/permissions.py`
//! of the source this engine's data model was distilled from: `Role`'s
//! `permissions` map is `module -> action -> bool`, membership lookup checks
//! `custom_permissions` before the role map, and a system role can never be
//! deleted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub owner_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub is_active: bool,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slug: slug.into(),
            owner_id,
            parent_id: None,
            is_active: true,
            settings: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub is_mfa_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Owner,
    Admin,
    Manager,
    Member,
    Viewer,
    Custom,
}

/// `module -> action -> allowed`.
pub type PermissionMap = HashMap<String, HashMap<String, bool>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub kind: RoleKind,
    pub is_system_role: bool,
    pub permissions: PermissionMap,
}

impl Role {
    pub fn owner(organization_id: Uuid) -> Self {
        let mut permissions: PermissionMap = HashMap::new();
        for module in [
            "workflows",
            "executions",
            "documents",
            "analytics",
            "members",
            "roles",
            "billing",
        ] {
            let mut actions = HashMap::new();
            for action in ["create", "read", "update", "delete"] {
                actions.insert(action.to_string(), true);
            }
            permissions.insert(module.to_string(), actions);
        }
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: "Owner".to_string(),
            kind: RoleKind::Owner,
            is_system_role: true,
            permissions,
        }
    }

    pub fn viewer(organization_id: Uuid) -> Self {
        let mut permissions: PermissionMap = HashMap::new();
        for module in ["workflows", "executions", "documents", "analytics"] {
            let mut actions = HashMap::new();
            actions.insert("read".to_string(), true);
            permissions.insert(module.to_string(), actions);
        }
        Self {
            id: Uuid::new_v4(),
            organization_id,
            name: "Viewer".to_string(),
            kind: RoleKind::Viewer,
            is_system_role: true,
            permissions,
        }
    }

    fn permits(&self, module: &str, action: &str) -> bool {
        self.permissions
            .get(module)
            .and_then(|actions| actions.get(action))
            .copied()
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Department {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub manager_id: Option<Uuid>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub principal_id: Uuid,
    pub role_id: Uuid,
    pub department_id: Option<Uuid>,
    pub is_active: bool,
    /// Overrides checked before the role's own permission map.
    pub custom_permissions: PermissionMap,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    /// `custom_permissions` wins over the role map, matching
    /// `OrganizationMember.has_permission` in the source this was distilled
    /// from.
    pub fn permits(&self, role: &Role, module: &str, action: &str) -> bool {
        if let Some(allowed) = self
            .custom_permissions
            .get(module)
            .and_then(|actions| actions.get(action))
        {
            return *allowed;
        }
        role.permits(module, action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role_id: Uuid,
    pub invited_by: Uuid,
    pub token: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn is_expired(&self) -> bool {
        self.status == InvitationStatus::Pending && Utc::now() > self.expires_at
    }

    /// Converts this pending invitation into a new membership, following the
    /// `default` role-lookup rule: the caller is expected to have already
    /// validated the invitation isn't expired/revoked.
    pub fn accept(&mut self, principal_id: Uuid) -> Result<Membership> {
        if self.status != InvitationStatus::Pending {
            return Err(Error::conflict(format!(
                "invitation {} is not pending",
                self.id
            )));
        }
        if self.is_expired() {
            self.status = InvitationStatus::Expired;
            return Err(Error::validation("invitation has expired"));
        }
        self.status = InvitationStatus::Accepted;
        self.accepted_at = Some(Utc::now());
        Ok(Membership {
            id: Uuid::new_v4(),
            organization_id: self.organization_id,
            principal_id,
            role_id: self.role_id,
            department_id: None,
            is_active: true,
            custom_permissions: HashMap::new(),
            joined_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    pub prefix: String,
    pub key_hash: String,
    pub is_active: bool,
    pub allowed_ips: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Invalidates the current key material and returns the new plaintext
    /// key (the only time it is ever available in plaintext). Matches
    /// `APIKey.rotate_key()` in the source: old and new key material are
    /// swapped atomically, never leaving a window with two valid keys.
    pub fn rotate(&mut self, new_hash: impl Into<String>, new_prefix: impl Into<String>) {
        self.key_hash = new_hash.into();
        self.prefix = new_prefix.into();
    }

    pub fn is_usable(&self, from_ip: Option<&str>) -> bool {
        if !self.is_active {
            return false;
        }
        if let Some(expires_at) = self.expires_at {
            if Utc::now() > expires_at {
                return false;
            }
        }
        if !self.allowed_ips.is_empty() {
            if let Some(ip) = from_ip {
                if !self.allowed_ips.iter().any(|allowed| allowed == ip) {
                    return false;
                }
            } else {
                return false;
            }
        }
        true
    }
}

/// Resolves organization context in the order: explicit header/param value,
/// then session default, then the principal's first active membership.
pub fn resolve_organization_context(
    explicit: Option<Uuid>,
    session_default: Option<Uuid>,
    memberships: &[Membership],
) -> Result<Uuid> {
    if let Some(org_id) = explicit {
        if memberships
            .iter()
            .any(|m| m.organization_id == org_id && m.is_active)
        {
            return Ok(org_id);
        }
        return Err(Error::permission("organizations", "read"));
    }
    if let Some(org_id) = session_default {
        if memberships
            .iter()
            .any(|m| m.organization_id == org_id && m.is_active)
        {
            return Ok(org_id);
        }
    }
    memberships
        .iter()
        .find(|m| m.is_active)
        .map(|m| m.organization_id)
        .ok_or_else(|| Error::permission("organizations", "read"))
}

/// `authorize(principal, org, module, action) -> bool`, the explicit
/// function Design Notes calls for in place of decorator-based permission
/// checks.
pub fn authorize(membership: &Membership, role: &Role, module: &str, action: &str) -> bool {
    membership.is_active && membership.permits(role, module, action)
}
