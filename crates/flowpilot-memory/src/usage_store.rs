//! In-memory and file-backed `UsageStore` implementations for quotas and
//! the append-only `UsageEvent` ledger.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use flowpilot_core::{Error, QuotaPeriod, ResourceKind, Result, UsageEvent, UsageQuota, UsageStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn quota_key(organization_id: Uuid, resource_kind: ResourceKind) -> (Uuid, ResourceKind) {
    (organization_id, resource_kind)
}

#[derive(Clone, Default)]
pub struct InMemoryUsageStore {
    quotas: Arc<DashMap<(Uuid, ResourceKind), UsageQuota>>,
    events: Arc<DashMap<Uuid, UsageEvent>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get_or_create_quota(
        &self,
        organization_id: Uuid,
        resource_kind: ResourceKind,
        period: QuotaPeriod,
        default_limit: u64,
        default_enforced: bool,
    ) -> Result<UsageQuota> {
        let key = quota_key(organization_id, resource_kind);
        if let Some(existing) = self.quotas.get(&key) {
            return Ok(existing.clone());
        }
        let quota = UsageQuota::new(organization_id, resource_kind, period, default_limit, default_enforced);
        self.quotas.insert(key, quota.clone());
        Ok(quota)
    }

    async fn save_quota(&self, quota: UsageQuota) -> Result<UsageQuota> {
        self.quotas
            .insert(quota_key(quota.organization_id, quota.resource_kind), quota.clone());
        Ok(quota)
    }

    async fn list_quotas(&self, organization_id: Uuid) -> Result<Vec<UsageQuota>> {
        Ok(self
            .quotas
            .iter()
            .filter(|q| q.organization_id == organization_id)
            .map(|q| q.value().clone())
            .collect())
    }

    async fn list_all_quotas(&self) -> Result<Vec<UsageQuota>> {
        Ok(self.quotas.iter().map(|q| q.value().clone()).collect())
    }

    async fn record_event(&self, event: UsageEvent) -> Result<UsageEvent> {
        self.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn list_events(&self, organization_id: Uuid) -> Result<Vec<UsageEvent>> {
        let mut out: Vec<UsageEvent> = self
            .events
            .iter()
            .filter(|e| e.organization_id == organization_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|e| e.recorded_at);
        Ok(out)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct UsageSnapshot {
    quotas: Vec<UsageQuota>,
    events: Vec<UsageEvent>,
}

pub struct FileUsageStore {
    inner: InMemoryUsageStore,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileUsageStore {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = InMemoryUsageStore::new();
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            let snapshot: UsageSnapshot = serde_json::from_str(&raw)
                .map_err(|e| Error::internal(format!("corrupt usage snapshot: {e}")))?;
            for q in snapshot.quotas {
                inner.quotas.insert(quota_key(q.organization_id, q.resource_kind), q);
            }
            for e in snapshot.events {
                inner.events.insert(e.id, e);
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
        let snapshot = UsageSnapshot {
            quotas: self.inner.quotas.iter().map(|e| e.value().clone()).collect(),
            events: self.inner.events.iter().map(|e| e.value().clone()).collect(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::internal(format!("failed to serialize usage snapshot: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| Error::internal(format!("failed to write usage snapshot: {e}")))
    }
}

#[async_trait]
impl UsageStore for FileUsageStore {
    async fn get_or_create_quota(
        &self,
        organization_id: Uuid,
        resource_kind: ResourceKind,
        period: QuotaPeriod,
        default_limit: u64,
        default_enforced: bool,
    ) -> Result<UsageQuota> {
        let out = self
            .inner
            .get_or_create_quota(organization_id, resource_kind, period, default_limit, default_enforced)
            .await?;
        self.persist().await?;
        Ok(out)
    }

    async fn save_quota(&self, quota: UsageQuota) -> Result<UsageQuota> {
        let out = self.inner.save_quota(quota).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_quotas(&self, organization_id: Uuid) -> Result<Vec<UsageQuota>> {
        self.inner.list_quotas(organization_id).await
    }

    async fn list_all_quotas(&self) -> Result<Vec<UsageQuota>> {
        self.inner.list_all_quotas().await
    }

    async fn record_event(&self, event: UsageEvent) -> Result<UsageEvent> {
        let out = self.inner.record_event(event).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_events(&self, organization_id: Uuid) -> Result<Vec<UsageEvent>> {
        self.inner.list_events(organization_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = InMemoryUsageStore::new();
        let org = Uuid::new_v4();
        let q1 = store
            .get_or_create_quota(org, ResourceKind::Executions, QuotaPeriod::Monthly, 100, true)
            .await
            .unwrap();
        let q2 = store
            .get_or_create_quota(org, ResourceKind::Executions, QuotaPeriod::Monthly, 999, false)
            .await
            .unwrap();
        assert_eq!(q1.id, q2.id);
        assert_eq!(q2.limit, 100);
    }

    #[tokio::test]
    async fn enforced_quota_never_exceeds_limit_across_saves() {
        let store = InMemoryUsageStore::new();
        let org = Uuid::new_v4();
        let mut quota = store
            .get_or_create_quota(org, ResourceKind::Executions, QuotaPeriod::Monthly, 1, true)
            .await
            .unwrap();
        quota.increment(1).unwrap();
        store.save_quota(quota.clone()).await.unwrap();
        assert!(quota.increment(1).is_err());
    }
}
