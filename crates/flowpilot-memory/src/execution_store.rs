//! In-memory and file-backed `ExecutionStore` implementations.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flowpilot_core::{Error, Execution, ExecutionLog, ExecutionStep, ExecutionStore, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    executions: Arc<DashMap<Uuid, Execution>>,
    steps: Arc<DashMap<Uuid, ExecutionStep>>,
    logs: Arc<DashMap<Uuid, ExecutionLog>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create_execution(&self, execution: Execution) -> Result<Execution> {
        if self.executions.contains_key(&execution.id) {
            return Err(Error::conflict(format!("execution {} already exists", execution.id)));
        }
        self.executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution> {
        self.executions
            .get(&id)
            .map(|e| e.clone())
            .ok_or_else(|| Error::not_found(format!("execution {id}")))
    }

    async fn save_execution(&self, execution: Execution, expected_version: u64) -> Result<Execution> {
        use dashmap::mapref::entry::Entry;
        match self.executions.entry(execution.id) {
            Entry::Vacant(_) => Err(Error::not_found(format!("execution {}", execution.id))),
            Entry::Occupied(mut entry) => {
                if entry.get().version != expected_version {
                    return Err(Error::conflict(format!(
                        "execution {} was modified concurrently (expected version {}, found {})",
                        execution.id,
                        expected_version,
                        entry.get().version
                    )));
                }
                entry.insert(execution.clone());
                Ok(execution)
            }
        }
    }

    async fn list_executions_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Execution>> {
        let mut out: Vec<Execution> = self
            .executions
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }

    async fn list_expired_leases(&self, now: DateTime<Utc>, lease_window: chrono::Duration) -> Result<Vec<Execution>> {
        Ok(self
            .executions
            .iter()
            .filter(|e| e.status == flowpilot_core::ExecutionStatus::Pending)
            .filter(|e| now - e.created_at > lease_window)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn count_in_flight(&self, workflow_id: Uuid, trigger_id: Option<Uuid>) -> Result<u64> {
        Ok(self
            .executions
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .filter(|e| trigger_id.is_none() || e.trigger_id == trigger_id)
            .filter(|e| !e.is_terminal())
            .count() as u64)
    }

    async fn create_step(&self, step: ExecutionStep) -> Result<ExecutionStep> {
        if self.steps.contains_key(&step.id) {
            return Err(Error::conflict(format!("step {} already exists", step.id)));
        }
        self.steps.insert(step.id, step.clone());
        Ok(step)
    }

    async fn save_step(&self, step: ExecutionStep) -> Result<ExecutionStep> {
        self.steps.insert(step.id, step.clone());
        Ok(step)
    }

    async fn list_steps(&self, execution_id: Uuid) -> Result<Vec<ExecutionStep>> {
        let mut out: Vec<ExecutionStep> = self
            .steps
            .iter()
            .filter(|s| s.execution_id == execution_id)
            .map(|s| s.value().clone())
            .collect();
        out.sort_by_key(|s| s.step_number);
        Ok(out)
    }

    async fn append_log(&self, log: ExecutionLog) -> Result<ExecutionLog> {
        self.logs.insert(log.id, log.clone());
        Ok(log)
    }

    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<ExecutionLog>> {
        let mut out: Vec<ExecutionLog> = self
            .logs
            .iter()
            .filter(|l| l.execution_id == execution_id)
            .map(|l| l.value().clone())
            .collect();
        out.sort_by_key(|l| l.timestamp);
        Ok(out)
    }

    async fn gc_logs(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let to_remove: Vec<Uuid> = self
            .logs
            .iter()
            .filter(|l| l.timestamp < older_than)
            .map(|l| l.id)
            .collect();
        for id in &to_remove {
            self.logs.remove(id);
        }
        Ok(to_remove.len() as u64)
    }
}

#[derive(Serialize, Deserialize, Default)]
struct ExecutionSnapshot {
    executions: Vec<Execution>,
    steps: Vec<ExecutionStep>,
    logs: Vec<ExecutionLog>,
}

pub struct FileExecutionStore {
    inner: InMemoryExecutionStore,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileExecutionStore {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = InMemoryExecutionStore::new();
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            let snapshot: ExecutionSnapshot = serde_json::from_str(&raw)
                .map_err(|e| Error::internal(format!("corrupt execution snapshot: {e}")))?;
            for e in snapshot.executions {
                inner.executions.insert(e.id, e);
            }
            for s in snapshot.steps {
                inner.steps.insert(s.id, s);
            }
            for l in snapshot.logs {
                inner.logs.insert(l.id, l);
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
        let snapshot = ExecutionSnapshot {
            executions: self.inner.executions.iter().map(|e| e.value().clone()).collect(),
            steps: self.inner.steps.iter().map(|e| e.value().clone()).collect(),
            logs: self.inner.logs.iter().map(|e| e.value().clone()).collect(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::internal(format!("failed to serialize execution snapshot: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| Error::internal(format!("failed to write execution snapshot: {e}")))
    }
}

#[async_trait]
impl ExecutionStore for FileExecutionStore {
    async fn create_execution(&self, execution: Execution) -> Result<Execution> {
        let out = self.inner.create_execution(execution).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_execution(&self, id: Uuid) -> Result<Execution> {
        self.inner.get_execution(id).await
    }

    async fn save_execution(&self, execution: Execution, expected_version: u64) -> Result<Execution> {
        let out = self.inner.save_execution(execution, expected_version).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_executions_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Execution>> {
        self.inner.list_executions_for_workflow(workflow_id).await
    }

    async fn list_expired_leases(&self, now: DateTime<Utc>, lease_window: chrono::Duration) -> Result<Vec<Execution>> {
        self.inner.list_expired_leases(now, lease_window).await
    }

    async fn count_in_flight(&self, workflow_id: Uuid, trigger_id: Option<Uuid>) -> Result<u64> {
        self.inner.count_in_flight(workflow_id, trigger_id).await
    }

    async fn create_step(&self, step: ExecutionStep) -> Result<ExecutionStep> {
        let out = self.inner.create_step(step).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn save_step(&self, step: ExecutionStep) -> Result<ExecutionStep> {
        let out = self.inner.save_step(step).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_steps(&self, execution_id: Uuid) -> Result<Vec<ExecutionStep>> {
        self.inner.list_steps(execution_id).await
    }

    async fn append_log(&self, log: ExecutionLog) -> Result<ExecutionLog> {
        let out = self.inner.append_log(log).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_logs(&self, execution_id: Uuid) -> Result<Vec<ExecutionLog>> {
        self.inner.list_logs(execution_id).await
    }

    async fn gc_logs(&self, older_than: DateTime<Utc>) -> Result<u64> {
        let removed = self.inner.gc_logs(older_than).await?;
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn step_numbers_dense_prefix() {
        let store = InMemoryExecutionStore::new();
        let exec = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        let exec_id = exec.id;
        store.create_execution(exec).await.unwrap();

        for n in 1..=3u32 {
            let step = ExecutionStep::new(exec_id, format!("node{n}"), "variable", n, serde_json::json!({}));
            store.create_step(step).await.unwrap();
        }
        let steps = store.list_steps(exec_id).await.unwrap();
        let numbers: Vec<u32> = steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn stale_save_rejected_as_conflict() {
        let store = InMemoryExecutionStore::new();
        let mut exec = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        store.create_execution(exec.clone()).await.unwrap();
        exec.start().unwrap();
        let saved = store.save_execution(exec.clone(), 0).await.unwrap();
        assert_eq!(saved.version, 1);

        // Stale write using the pre-transition version should fail.
        let mut stale = saved.clone();
        stale.pause().unwrap();
        let err = store.save_execution(stale, 0).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn gc_logs_removes_only_old_entries() {
        let store = InMemoryExecutionStore::new();
        let exec_id = Uuid::new_v4();
        let old = ExecutionLog {
            timestamp: Utc::now() - chrono::Duration::days(60),
            ..ExecutionLog::new(exec_id, None, flowpilot_core::LogLevel::Info, "old")
        };
        let recent = ExecutionLog::new(exec_id, None, flowpilot_core::LogLevel::Info, "recent");
        store.append_log(old).await.unwrap();
        store.append_log(recent).await.unwrap();

        let removed = store.gc_logs(Utc::now() - chrono::Duration::days(30)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list_logs(exec_id).await.unwrap().len(), 1);
    }
}
