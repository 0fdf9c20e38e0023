//! In-memory and file-backed `TenancyStore`: organizations, principals,
//! roles, memberships, invitations, API keys.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use flowpilot_core::{ApiKey, Error, Invitation, Membership, Organization, Principal, Result, Role, TenancyStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryTenancyStore {
    organizations: Arc<DashMap<Uuid, Organization>>,
    principals: Arc<DashMap<Uuid, Principal>>,
    roles: Arc<DashMap<Uuid, Role>>,
    memberships: Arc<DashMap<(Uuid, Uuid), Membership>>,
    invitations: Arc<DashMap<String, Invitation>>,
    api_keys: Arc<DashMap<String, ApiKey>>,
}

impl InMemoryTenancyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenancyStore for InMemoryTenancyStore {
    async fn get_organization(&self, id: Uuid) -> Result<Organization> {
        self.organizations
            .get(&id)
            .map(|o| o.clone())
            .ok_or_else(|| Error::not_found(format!("organization {id}")))
    }

    async fn save_organization(&self, org: Organization) -> Result<Organization> {
        let clash = self
            .organizations
            .iter()
            .any(|entry| entry.id != org.id && entry.slug == org.slug);
        if clash {
            return Err(Error::conflict(format!("organization slug {} already in use", org.slug)));
        }
        self.organizations.insert(org.id, org.clone());
        Ok(org)
    }

    async fn get_organization_by_slug(&self, slug: &str) -> Result<Organization> {
        self.organizations
            .iter()
            .find(|o| o.slug == slug)
            .map(|o| o.value().clone())
            .ok_or_else(|| Error::not_found(format!("organization with slug {slug}")))
    }

    async fn get_principal(&self, id: Uuid) -> Result<Principal> {
        self.principals
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| Error::not_found(format!("principal {id}")))
    }

    async fn get_principal_by_email(&self, email: &str) -> Result<Principal> {
        self.principals
            .iter()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .map(|p| p.value().clone())
            .ok_or_else(|| Error::not_found(format!("principal with email {email}")))
    }

    async fn save_principal(&self, principal: Principal) -> Result<Principal> {
        let clash = self
            .principals
            .iter()
            .any(|entry| entry.id != principal.id && entry.email.eq_ignore_ascii_case(&principal.email));
        if clash {
            return Err(Error::conflict(format!("email {} already in use", principal.email)));
        }
        self.principals.insert(principal.id, principal.clone());
        Ok(principal)
    }

    async fn get_role(&self, id: Uuid) -> Result<Role> {
        self.roles
            .get(&id)
            .map(|r| r.clone())
            .ok_or_else(|| Error::not_found(format!("role {id}")))
    }

    async fn save_role(&self, role: Role) -> Result<Role> {
        self.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn list_roles(&self, organization_id: Uuid) -> Result<Vec<Role>> {
        Ok(self
            .roles
            .iter()
            .filter(|r| r.organization_id == organization_id)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn get_membership(&self, organization_id: Uuid, principal_id: Uuid) -> Result<Membership> {
        self.memberships
            .get(&(organization_id, principal_id))
            .map(|m| m.clone())
            .ok_or_else(|| Error::not_found(format!("membership for {principal_id} in {organization_id}")))
    }

    async fn save_membership(&self, membership: Membership) -> Result<Membership> {
        // At most one membership per (organization, principal).
        self.memberships.insert(
            (membership.organization_id, membership.principal_id),
            membership.clone(),
        );
        Ok(membership)
    }

    async fn list_memberships_for_principal(&self, principal_id: Uuid) -> Result<Vec<Membership>> {
        Ok(self
            .memberships
            .iter()
            .filter(|entry| entry.key().1 == principal_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn save_invitation(&self, invitation: Invitation) -> Result<Invitation> {
        self.invitations.insert(invitation.token.clone(), invitation.clone());
        Ok(invitation)
    }

    async fn get_invitation_by_token(&self, token: &str) -> Result<Invitation> {
        self.invitations
            .get(token)
            .map(|i| i.clone())
            .ok_or_else(|| Error::not_found("invitation not found for token"))
    }

    async fn save_api_key(&self, key: ApiKey) -> Result<ApiKey> {
        self.api_keys.insert(key.prefix.clone(), key.clone());
        Ok(key)
    }

    async fn get_api_key_by_prefix(&self, prefix: &str) -> Result<ApiKey> {
        self.api_keys
            .get(prefix)
            .map(|k| k.clone())
            .ok_or_else(|| Error::not_found(format!("api key with prefix {prefix}")))
    }
}

#[derive(Serialize, Deserialize, Default)]
struct TenancySnapshot {
    organizations: Vec<Organization>,
    principals: Vec<Principal>,
    roles: Vec<Role>,
    memberships: Vec<Membership>,
    invitations: Vec<Invitation>,
    api_keys: Vec<ApiKey>,
}

pub struct FileTenancyStore {
    inner: InMemoryTenancyStore,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileTenancyStore {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = InMemoryTenancyStore::new();
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            let snapshot: TenancySnapshot = serde_json::from_str(&raw)
                .map_err(|e| Error::internal(format!("corrupt tenancy snapshot: {e}")))?;
            for o in snapshot.organizations {
                inner.organizations.insert(o.id, o);
            }
            for p in snapshot.principals {
                inner.principals.insert(p.id, p);
            }
            for r in snapshot.roles {
                inner.roles.insert(r.id, r);
            }
            for m in snapshot.memberships {
                inner.memberships.insert((m.organization_id, m.principal_id), m);
            }
            for i in snapshot.invitations {
                inner.invitations.insert(i.token.clone(), i);
            }
            for k in snapshot.api_keys {
                inner.api_keys.insert(k.prefix.clone(), k);
            }
        }
        Ok(Self {
            inner,
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = TenancySnapshot {
            organizations: self.inner.organizations.iter().map(|e| e.value().clone()).collect(),
            principals: self.inner.principals.iter().map(|e| e.value().clone()).collect(),
            roles: self.inner.roles.iter().map(|e| e.value().clone()).collect(),
            memberships: self.inner.memberships.iter().map(|e| e.value().clone()).collect(),
            invitations: self.inner.invitations.iter().map(|e| e.value().clone()).collect(),
            api_keys: self.inner.api_keys.iter().map(|e| e.value().clone()).collect(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::internal(format!("failed to serialize tenancy snapshot: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| Error::internal(format!("failed to write tenancy snapshot: {e}")))
    }
}

#[async_trait]
impl TenancyStore for FileTenancyStore {
    async fn get_organization(&self, id: Uuid) -> Result<Organization> {
        self.inner.get_organization(id).await
    }

    async fn save_organization(&self, org: Organization) -> Result<Organization> {
        let out = self.inner.save_organization(org).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_organization_by_slug(&self, slug: &str) -> Result<Organization> {
        self.inner.get_organization_by_slug(slug).await
    }

    async fn get_principal(&self, id: Uuid) -> Result<Principal> {
        self.inner.get_principal(id).await
    }

    async fn get_principal_by_email(&self, email: &str) -> Result<Principal> {
        self.inner.get_principal_by_email(email).await
    }

    async fn save_principal(&self, principal: Principal) -> Result<Principal> {
        let out = self.inner.save_principal(principal).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_role(&self, id: Uuid) -> Result<Role> {
        self.inner.get_role(id).await
    }

    async fn save_role(&self, role: Role) -> Result<Role> {
        let out = self.inner.save_role(role).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_roles(&self, organization_id: Uuid) -> Result<Vec<Role>> {
        self.inner.list_roles(organization_id).await
    }

    async fn get_membership(&self, organization_id: Uuid, principal_id: Uuid) -> Result<Membership> {
        self.inner.get_membership(organization_id, principal_id).await
    }

    async fn save_membership(&self, membership: Membership) -> Result<Membership> {
        let out = self.inner.save_membership(membership).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_memberships_for_principal(&self, principal_id: Uuid) -> Result<Vec<Membership>> {
        self.inner.list_memberships_for_principal(principal_id).await
    }

    async fn save_invitation(&self, invitation: Invitation) -> Result<Invitation> {
        let out = self.inner.save_invitation(invitation).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_invitation_by_token(&self, token: &str) -> Result<Invitation> {
        self.inner.get_invitation_by_token(token).await
    }

    async fn save_api_key(&self, key: ApiKey) -> Result<ApiKey> {
        let out = self.inner.save_api_key(key).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_api_key_by_prefix(&self, prefix: &str) -> Result<ApiKey> {
        self.inner.get_api_key_by_prefix(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_slug_rejected() {
        let store = InMemoryTenancyStore::new();
        let org1 = Organization::new("Acme", "acme", Uuid::new_v4());
        store.save_organization(org1).await.unwrap();
        let org2 = Organization::new("Acme Two", "acme", Uuid::new_v4());
        assert!(store.save_organization(org2).await.is_err());
    }

    #[tokio::test]
    async fn at_most_one_membership_per_org_principal() {
        let store = InMemoryTenancyStore::new();
        let org = Uuid::new_v4();
        let principal = Uuid::new_v4();
        let role_a = Uuid::new_v4();
        let role_b = Uuid::new_v4();
        store
            .save_membership(Membership {
                id: Uuid::new_v4(),
                organization_id: org,
                principal_id: principal,
                role_id: role_a,
                department_id: None,
                is_active: true,
                custom_permissions: Default::default(),
                joined_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        store
            .save_membership(Membership {
                id: Uuid::new_v4(),
                organization_id: org,
                principal_id: principal,
                role_id: role_b,
                department_id: None,
                is_active: true,
                custom_permissions: Default::default(),
                joined_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        let fetched = store.get_membership(org, principal).await.unwrap();
        assert_eq!(fetched.role_id, role_b);
    }
}
