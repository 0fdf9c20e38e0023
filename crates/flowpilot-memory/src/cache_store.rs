//! In-memory and file-backed `CacheStore` implementations for the semantic
//! cache and its `AIRequest` ledger.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flowpilot_core::{AiRequest, CacheStore, Error, Result, SemanticCacheEntry};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn cache_key(prompt_hash: &str, model: &str) -> String {
    format!("{prompt_hash}:{model}")
}

#[derive(Clone, Default)]
pub struct InMemoryCacheStore {
    entries: Arc<DashMap<String, SemanticCacheEntry>>,
    requests: Arc<DashMap<Uuid, AiRequest>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn lookup(&self, prompt_hash: &str, model: &str) -> Result<Option<SemanticCacheEntry>> {
        Ok(self.entries.get(&cache_key(prompt_hash, model)).map(|e| e.clone()))
    }

    async fn upsert(&self, entry: SemanticCacheEntry) -> Result<SemanticCacheEntry> {
        let key = cache_key(&entry.prompt_hash, &entry.model);
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    async fn record_hit(&self, prompt_hash: &str, model: &str, at: DateTime<Utc>) -> Result<SemanticCacheEntry> {
        let key = cache_key(prompt_hash, model);
        let mut entry = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| Error::not_found(format!("cache entry for {prompt_hash}/{model}")))?;
        entry.record_hit(at);
        Ok(entry.clone())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_valid(now))
            .map(|e| e.key().clone())
            .collect();
        for key in &expired {
            self.entries.remove(key);
        }
        Ok(expired.len() as u64)
    }

    async fn record_ai_request(&self, request: AiRequest) -> Result<AiRequest> {
        self.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn list_ai_requests(&self, execution_id: Uuid) -> Result<Vec<AiRequest>> {
        let mut out: Vec<AiRequest> = self
            .requests
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .map(|r| r.value().clone())
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct CacheSnapshot {
    entries: Vec<SemanticCacheEntry>,
    requests: Vec<AiRequest>,
}

pub struct FileCacheStore {
    inner: InMemoryCacheStore,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileCacheStore {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = InMemoryCacheStore::new();
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            let snapshot: CacheSnapshot = serde_json::from_str(&raw)
                .map_err(|e| Error::internal(format!("corrupt cache snapshot: {e}")))?;
            for e in snapshot.entries {
                inner.entries.insert(cache_key(&e.prompt_hash, &e.model), e);
            }
            for r in snapshot.requests {
                inner.requests.insert(r.id, r);
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
        let snapshot = CacheSnapshot {
            entries: self.inner.entries.iter().map(|e| e.value().clone()).collect(),
            requests: self.inner.requests.iter().map(|e| e.value().clone()).collect(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::internal(format!("failed to serialize cache snapshot: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| Error::internal(format!("failed to write cache snapshot: {e}")))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn lookup(&self, prompt_hash: &str, model: &str) -> Result<Option<SemanticCacheEntry>> {
        self.inner.lookup(prompt_hash, model).await
    }

    async fn upsert(&self, entry: SemanticCacheEntry) -> Result<SemanticCacheEntry> {
        let out = self.inner.upsert(entry).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn record_hit(&self, prompt_hash: &str, model: &str, at: DateTime<Utc>) -> Result<SemanticCacheEntry> {
        let out = self.inner.record_hit(prompt_hash, model, at).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = self.inner.purge_expired(now).await?;
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn record_ai_request(&self, request: AiRequest) -> Result<AiRequest> {
        let out = self.inner.record_ai_request(request).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_ai_requests(&self, execution_id: Uuid) -> Result<Vec<AiRequest>> {
        self.inner.list_ai_requests(execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_returns_same_response_and_increments_count() {
        let store = InMemoryCacheStore::new();
        let entry = SemanticCacheEntry::new("hello", "claude-3", "hi there", 3600);
        store.upsert(entry.clone()).await.unwrap();

        let hit1 = store.record_hit(&entry.prompt_hash, &entry.model, Utc::now()).await.unwrap();
        assert_eq!(hit1.response, "hi there");
        assert_eq!(hit1.hit_count, 1);

        let hit2 = store.record_hit(&entry.prompt_hash, &entry.model, Utc::now()).await.unwrap();
        assert_eq!(hit2.hit_count, 2);
    }

    #[tokio::test]
    async fn purge_expired_only_removes_expired() {
        let store = InMemoryCacheStore::new();
        let fresh = SemanticCacheEntry::new("fresh", "m", "r", 3600);
        let stale = SemanticCacheEntry::new("stale", "m", "r", -10);
        store.upsert(fresh.clone()).await.unwrap();
        store.upsert(stale.clone()).await.unwrap();

        let removed = store.purge_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.lookup(&fresh.prompt_hash, "m").await.unwrap().is_some());
        assert!(store.lookup(&stale.prompt_hash, "m").await.unwrap().is_none());
    }
}
