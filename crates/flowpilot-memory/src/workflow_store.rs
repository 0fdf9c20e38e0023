//! In-memory and file-backed `WorkflowStore` implementations.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use flowpilot_core::{
    Error, Result, Workflow, WorkflowFilter, WorkflowStore, WorkflowTrigger, WorkflowVersion,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lock-free concurrent `WorkflowStore`, cleared on restart.
#[derive(Clone, Default)]
pub struct InMemoryWorkflowStore {
    workflows: Arc<DashMap<Uuid, Workflow>>,
    versions: Arc<DashMap<(Uuid, u32), WorkflowVersion>>,
    triggers: Arc<DashMap<Uuid, WorkflowTrigger>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        if self.workflows.contains_key(&workflow.id) {
            return Err(Error::conflict(format!("workflow {} already exists", workflow.id)));
        }
        self.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get_workflow(&self, organization_id: Uuid, id: Uuid) -> Result<Workflow> {
        self.workflows
            .get(&id)
            .filter(|w| w.organization_id == organization_id)
            .map(|w| w.clone())
            .ok_or_else(|| Error::not_found(format!("workflow {id}")))
    }

    async fn get_workflow_by_id(&self, id: Uuid) -> Result<Workflow> {
        self.workflows
            .get(&id)
            .map(|w| w.clone())
            .ok_or_else(|| Error::not_found(format!("workflow {id}")))
    }

    async fn save_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        self.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn list_workflows(&self, organization_id: Uuid, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        let mut out: Vec<Workflow> = self
            .workflows
            .iter()
            .filter(|entry| entry.organization_id == organization_id)
            .filter(|entry| filter.status.map(|s| s == entry.status).unwrap_or(true))
            .filter(|entry| filter.tag.as_ref().map(|t| entry.tags.contains(t)).unwrap_or(true))
            .filter(|entry| {
                filter
                    .name_contains
                    .as_ref()
                    .map(|needle| entry.name.to_lowercase().contains(&needle.to_lowercase()))
                    .unwrap_or(true)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|w| w.created_at);
        Ok(out)
    }

    async fn delete_workflow(&self, organization_id: Uuid, id: Uuid) -> Result<()> {
        let existed = self
            .workflows
            .remove_if(&id, |_, w| w.organization_id == organization_id)
            .is_some();
        if !existed {
            return Err(Error::not_found(format!("workflow {id}")));
        }
        self.versions.retain(|(wf_id, _), _| *wf_id != id);
        self.triggers.retain(|_, t| t.workflow_id != id);
        Ok(())
    }

    async fn save_version(&self, version: WorkflowVersion) -> Result<WorkflowVersion> {
        self.versions
            .insert((version.workflow_id, version.version), version.clone());
        Ok(version)
    }

    async fn get_version(&self, workflow_id: Uuid, version: u32) -> Result<WorkflowVersion> {
        self.versions
            .get(&(workflow_id, version))
            .map(|v| v.clone())
            .ok_or_else(|| Error::not_found(format!("version {version} of workflow {workflow_id}")))
    }

    async fn list_versions(&self, workflow_id: Uuid) -> Result<Vec<WorkflowVersion>> {
        let mut out: Vec<WorkflowVersion> = self
            .versions
            .iter()
            .filter(|entry| entry.key().0 == workflow_id)
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|v| v.version);
        Ok(out)
    }

    async fn gc_versions(&self, workflow_id: Uuid, keep_most_recent: u32, current_version: u32) -> Result<u32> {
        let mut versions = self.list_versions(workflow_id).await?;
        versions.sort_by_key(|v| std::cmp::Reverse(v.version));
        let mut removed = 0u32;
        for v in versions.into_iter().skip(keep_most_recent as usize) {
            if v.version == current_version {
                continue;
            }
            self.versions.remove(&(workflow_id, v.version));
            removed += 1;
        }
        Ok(removed)
    }

    async fn save_trigger(&self, trigger: WorkflowTrigger) -> Result<WorkflowTrigger> {
        if let Some(path) = &trigger.webhook_path {
            let clashes = self
                .triggers
                .iter()
                .any(|entry| entry.id != trigger.id && entry.webhook_path.as_deref() == Some(path.as_str()));
            if clashes {
                return Err(Error::conflict(format!("webhook path {path} already in use")));
            }
        }
        self.triggers.insert(trigger.id, trigger.clone());
        Ok(trigger)
    }

    async fn get_trigger(&self, id: Uuid) -> Result<WorkflowTrigger> {
        self.triggers
            .get(&id)
            .map(|t| t.clone())
            .ok_or_else(|| Error::not_found(format!("trigger {id}")))
    }

    async fn list_triggers(&self, workflow_id: Uuid) -> Result<Vec<WorkflowTrigger>> {
        Ok(self
            .triggers
            .iter()
            .filter(|entry| entry.workflow_id == workflow_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_active_scheduled_triggers(&self) -> Result<Vec<WorkflowTrigger>> {
        Ok(self
            .triggers
            .iter()
            .filter(|entry| entry.is_active && entry.kind == flowpilot_core::TriggerKind::Scheduled)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_trigger_by_webhook_path(&self, path: &str) -> Result<WorkflowTrigger> {
        self.triggers
            .iter()
            .find(|entry| entry.webhook_path.as_deref() == Some(path))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::not_found(format!("no trigger with webhook path {path}")))
    }

    async fn list_active_event_triggers(&self, event_type: &str) -> Result<Vec<WorkflowTrigger>> {
        Ok(self
            .triggers
            .iter()
            .filter(|entry| {
                entry.is_active
                    && entry.kind == flowpilot_core::TriggerKind::Event
                    && entry.event_type.as_deref() == Some(event_type)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[derive(Serialize, Deserialize, Default)]
struct WorkflowSnapshot {
    workflows: Vec<Workflow>,
    versions: Vec<WorkflowVersion>,
    triggers: Vec<WorkflowTrigger>,
}

/// Persists a JSON snapshot after every mutating call, mirroring
/// `aof-memory`'s `FileBackend` write-through behavior.
pub struct FileWorkflowStore {
    inner: InMemoryWorkflowStore,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileWorkflowStore {
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let inner = InMemoryWorkflowStore::new();
        if let Ok(raw) = tokio::fs::read_to_string(&path).await {
            let snapshot: WorkflowSnapshot = serde_json::from_str(&raw)
                .map_err(|e| Error::internal(format!("corrupt workflow snapshot: {e}")))?;
            for w in snapshot.workflows {
                inner.workflows.insert(w.id, w);
            }
            for v in snapshot.versions {
                inner.versions.insert((v.workflow_id, v.version), v);
            }
            for t in snapshot.triggers {
                inner.triggers.insert(t.id, t);
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
        let snapshot = WorkflowSnapshot {
            workflows: self.inner.workflows.iter().map(|e| e.value().clone()).collect(),
            versions: self.inner.versions.iter().map(|e| e.value().clone()).collect(),
            triggers: self.inner.triggers.iter().map(|e| e.value().clone()).collect(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::internal(format!("failed to serialize workflow snapshot: {e}")))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| Error::internal(format!("failed to write workflow snapshot: {e}")))
    }
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        let out = self.inner.create_workflow(workflow).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_workflow(&self, organization_id: Uuid, id: Uuid) -> Result<Workflow> {
        self.inner.get_workflow(organization_id, id).await
    }

    async fn get_workflow_by_id(&self, id: Uuid) -> Result<Workflow> {
        self.inner.get_workflow_by_id(id).await
    }

    async fn save_workflow(&self, workflow: Workflow) -> Result<Workflow> {
        let out = self.inner.save_workflow(workflow).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn list_workflows(&self, organization_id: Uuid, filter: &WorkflowFilter) -> Result<Vec<Workflow>> {
        self.inner.list_workflows(organization_id, filter).await
    }

    async fn delete_workflow(&self, organization_id: Uuid, id: Uuid) -> Result<()> {
        self.inner.delete_workflow(organization_id, id).await?;
        self.persist().await
    }

    async fn save_version(&self, version: WorkflowVersion) -> Result<WorkflowVersion> {
        let out = self.inner.save_version(version).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_version(&self, workflow_id: Uuid, version: u32) -> Result<WorkflowVersion> {
        self.inner.get_version(workflow_id, version).await
    }

    async fn list_versions(&self, workflow_id: Uuid) -> Result<Vec<WorkflowVersion>> {
        self.inner.list_versions(workflow_id).await
    }

    async fn gc_versions(&self, workflow_id: Uuid, keep_most_recent: u32, current_version: u32) -> Result<u32> {
        let removed = self.inner.gc_versions(workflow_id, keep_most_recent, current_version).await?;
        if removed > 0 {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn save_trigger(&self, trigger: WorkflowTrigger) -> Result<WorkflowTrigger> {
        let out = self.inner.save_trigger(trigger).await?;
        self.persist().await?;
        Ok(out)
    }

    async fn get_trigger(&self, id: Uuid) -> Result<WorkflowTrigger> {
        self.inner.get_trigger(id).await
    }

    async fn list_triggers(&self, workflow_id: Uuid) -> Result<Vec<WorkflowTrigger>> {
        self.inner.list_triggers(workflow_id).await
    }

    async fn list_active_scheduled_triggers(&self) -> Result<Vec<WorkflowTrigger>> {
        self.inner.list_active_scheduled_triggers().await
    }

    async fn find_trigger_by_webhook_path(&self, path: &str) -> Result<WorkflowTrigger> {
        self.inner.find_trigger_by_webhook_path(path).await
    }

    async fn list_active_event_triggers(&self, event_type: &str) -> Result<Vec<WorkflowTrigger>> {
        self.inner.list_active_event_triggers(event_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::GraphDefinition;

    fn sample_workflow(org: Uuid) -> Workflow {
        Workflow::new(org, "demo", GraphDefinition::default()).unwrap()
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let store = InMemoryWorkflowStore::new();
        let org = Uuid::new_v4();
        let wf = sample_workflow(org);
        let created = store.create_workflow(wf.clone()).await.unwrap();
        let fetched = store.get_workflow(org, created.id).await.unwrap();
        assert_eq!(fetched.id, wf.id);
        assert_eq!(fetched.definition.nodes.len(), wf.definition.nodes.len());
    }

    #[tokio::test]
    async fn file_store_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflows.json");
        let org = Uuid::new_v4();
        let id = {
            let store = FileWorkflowStore::new(&path).await.unwrap();
            let wf = sample_workflow(org);
            let created = store.create_workflow(wf).await.unwrap();
            created.id
        };
        let reloaded = FileWorkflowStore::new(&path).await.unwrap();
        let fetched = reloaded.get_workflow(org, id).await.unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn rollback_keeps_both_versions() {
        let store = InMemoryWorkflowStore::new();
        let org = Uuid::new_v4();
        let wf = store.create_workflow(sample_workflow(org)).await.unwrap();

        let v1 = flowpilot_core::create_version(&wf, GraphDefinition::default(), None, None).unwrap();
        store.save_version(v1.clone()).await.unwrap();

        let mut def2 = GraphDefinition::default();
        def2.nodes.push(flowpilot_core::Node {
            id: "a".into(),
            name: None,
            type_name: "variable".into(),
            config: serde_json::json!({}),
        });
        let mut wf_at_v1 = wf.clone();
        wf_at_v1.version = v1.version;
        let v2 = flowpilot_core::create_version(&wf_at_v1, def2, None, None).unwrap();
        store.save_version(v2.clone()).await.unwrap();

        let versions = store.list_versions(wf.id).await.unwrap();
        assert_eq!(versions.len(), 2);
        let fetched_v1 = store.get_version(wf.id, v1.version).await.unwrap();
        assert_eq!(fetched_v1.definition.nodes.len(), 0);
    }

    #[tokio::test]
    async fn duplicate_webhook_path_rejected() {
        let store = InMemoryWorkflowStore::new();
        let wf_id = Uuid::new_v4();
        let mut t1 = WorkflowTrigger::new_manual(wf_id, "t1");
        t1.webhook_path = Some("/hook/abc".into());
        store.save_trigger(t1).await.unwrap();

        let mut t2 = WorkflowTrigger::new_manual(wf_id, "t2");
        t2.webhook_path = Some("/hook/abc".into());
        assert!(store.save_trigger(t2).await.is_err());
    }

    #[tokio::test]
    async fn event_triggers_filtered_by_type_and_active_flag() {
        let store = InMemoryWorkflowStore::new();
        let wf_id = Uuid::new_v4();

        let mut t1 = WorkflowTrigger::new_manual(wf_id, "on-upload");
        t1.kind = flowpilot_core::TriggerKind::Event;
        t1.event_type = Some("document.uploaded".into());
        store.save_trigger(t1).await.unwrap();

        let mut t2 = WorkflowTrigger::new_manual(wf_id, "on-upload-inactive");
        t2.kind = flowpilot_core::TriggerKind::Event;
        t2.event_type = Some("document.uploaded".into());
        t2.is_active = false;
        store.save_trigger(t2).await.unwrap();

        let mut t3 = WorkflowTrigger::new_manual(wf_id, "on-delete");
        t3.kind = flowpilot_core::TriggerKind::Event;
        t3.event_type = Some("document.deleted".into());
        store.save_trigger(t3).await.unwrap();

        let matches = store.list_active_event_triggers("document.uploaded").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "on-upload");
    }
}
