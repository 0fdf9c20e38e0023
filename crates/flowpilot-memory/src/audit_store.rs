//! In-memory and file-backed `AuditStore`. Append-only: there is no update
//! or delete path besides the TTL-driven `gc`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flowpilot_core::{AuditLog, AuditStore, Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    entries: Arc<DashMap<Uuid, AuditLog>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditLog) -> Result<AuditLog> {
        self.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn list_for_org(&self, organization_id: Uuid) -> Result<Vec<AuditLog>> {
        let mut out: Vec<AuditLog> = self
            .entries
            .iter()
            .filter(|e| e.organization_id == Some(organization_id))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|e| e.timestamp);
        Ok(out)
    }

    async fn gc(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let stale: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|e| e.timestamp < older_than)
            .map(|e| e.id)
            .collect();
        for id in &stale {
            self.entries.remove(id);
        }
        Ok(stale.len() as u64)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct AuditSnapshot {
    entries: Vec<AuditLog>,
}

pub struct FileAuditStore {
    inner: InMemoryAuditStore,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileAuditStore {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = InMemoryAuditStore::new();
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            let snapshot: AuditSnapshot = serde_json::from_str(&raw)
                .map_err(|e| Error::internal(format!("corrupt audit snapshot: {e}")))?;
            for e in snapshot.entries {
                inner.entries.insert(e.id, e);
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
        let snapshot = AuditSnapshot {
            entries: self.inner.entries.iter().map(|e| e.value().clone()).collect(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::internal(format!("failed to serialize audit snapshot: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| Error::internal(format!("failed to write audit snapshot: {e}")))
    }
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn append(&self, entry: AuditLog) -> Result<AuditLog> {
        let out = self.inner.append(entry).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_for_org(&self, organization_id: Uuid) -> Result<Vec<AuditLog>> {
        self.inner.list_for_org(organization_id).await
    }

    async fn gc(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let removed = self.inner.gc(older_than).await?;
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::{AuditEventKind, AuditOutcome};

    #[tokio::test]
    async fn append_only_list_scoped_to_org() {
        let store = InMemoryAuditStore::new();
        let org = Uuid::new_v4();
        store
            .append(AuditLog::new(AuditEventKind::PermissionDenied, AuditOutcome::Failure).with_org(org))
            .await
            .unwrap();
        store
            .append(AuditLog::new(AuditEventKind::AuthSuccess, AuditOutcome::Success).with_org(Uuid::new_v4()))
            .await
            .unwrap();

        let entries = store.list_for_org(org).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_kind, AuditEventKind::PermissionDenied);
    }
}
