//! `Execution`, `ExecutionStep`, `ExecutionLog`, and the pure state-machine
//! transition function from §4.4/§4.5. Persistence is an explicit, separate
//! `store.save(execution)` call made by whatever owns the transition (the
//! Scheduler or the Runner), never a method that saves itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    pub kind: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ExecutionError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            details: serde_json::json!({}),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub memory_bytes: Option<u64>,
    pub cpu_millis: Option<u64>,
    pub ai_tokens_used: u64,
    pub ai_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<ExecutionError>,
    pub context: HashMap<String, serde_json::Value>,
    pub trigger_id: Option<Uuid>,
    pub principal_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub metrics: ExecutionMetrics,
    pub retry_count: u32,
    pub max_retries: u32,
    pub parent_execution_id: Option<Uuid>,
    pub deadline: DateTime<Utc>,
    pub metadata: serde_json::Value,
    /// Optimistic lock: bumped on every saved transition. A stale write
    /// (caller's `version` doesn't match the stored row) fails as a
    /// retryable `Conflict`.
    pub version: u64,
}

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_EXECUTION_TIMEOUT_SECS: i64 = 3600;

impl Execution {
    /// `submit -> pending`.
    pub fn submit(
        organization_id: Uuid,
        workflow_id: Uuid,
        input: serde_json::Value,
        trigger_id: Option<Uuid>,
        principal_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            workflow_id,
            status: ExecutionStatus::Pending,
            input,
            output: None,
            error: None,
            context: HashMap::new(),
            trigger_id,
            principal_id,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            metrics: ExecutionMetrics::default(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            parent_execution_id: None,
            deadline: now + chrono::Duration::seconds(DEFAULT_EXECUTION_TIMEOUT_SECS),
            metadata: serde_json::json!({}),
            version: 0,
        }
    }

    fn bump(&mut self) {
        self.version += 1;
    }

    /// `start -> running`. Only pending executions may start.
    pub fn start(&mut self) -> Result<()> {
        if self.status != ExecutionStatus::Pending {
            return Err(Error::conflict(format!(
                "execution {} cannot start from status {:?}",
                self.id, self.status
            )));
        }
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.bump();
        Ok(())
    }

    /// `complete -> completed`.
    pub fn complete(&mut self, output: serde_json::Value) -> Result<()> {
        if self.status != ExecutionStatus::Running {
            return Err(Error::conflict(format!(
                "execution {} cannot complete from status {:?}",
                self.id, self.status
            )));
        }
        let now = Utc::now();
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(now);
        self.output = Some(output);
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
        self.bump();
        Ok(())
    }

    /// `fail -> failed`. Allowed from `pending` (e.g. immediate validation
    /// failure before a single node runs) or `running`.
    pub fn fail(&mut self, error: ExecutionError) -> Result<()> {
        if !matches!(self.status, ExecutionStatus::Pending | ExecutionStatus::Running) {
            return Err(Error::conflict(format!(
                "execution {} cannot fail from status {:?}",
                self.id, self.status
            )));
        }
        let now = Utc::now();
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(now);
        self.error = Some(error);
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
        self.bump();
        Ok(())
    }

    /// `pause`/`resume` valid only from/to `running`.
    pub fn pause(&mut self) -> Result<()> {
        if self.status != ExecutionStatus::Running {
            return Err(Error::conflict("pause is only valid from running"));
        }
        self.status = ExecutionStatus::Paused;
        self.bump();
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.status != ExecutionStatus::Paused {
            return Err(Error::conflict("resume is only valid from paused"));
        }
        self.status = ExecutionStatus::Running;
        self.bump();
        Ok(())
    }

    /// `cancel -> cancelled`, valid from `pending`, `running`, or `paused`.
    pub fn cancel(&mut self) -> Result<()> {
        if !matches!(
            self.status,
            ExecutionStatus::Pending | ExecutionStatus::Running | ExecutionStatus::Paused
        ) {
            return Err(Error::conflict(format!(
                "execution {} cannot be cancelled from status {:?}",
                self.id, self.status
            )));
        }
        let now = Utc::now();
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
        self.bump();
        Ok(())
    }

    /// `retry`: only from `failed` with budget remaining. Produces a new
    /// child execution inheriting `input`, `context`, `trigger`.
    pub fn retry(&self) -> Result<Execution> {
        if self.status != ExecutionStatus::Failed {
            return Err(Error::conflict("retry is only valid from a failed execution"));
        }
        if self.retry_count >= self.max_retries {
            return Err(Error::validation(format!(
                "execution {} has exhausted its {} retries",
                self.id, self.max_retries
            )));
        }
        let now = Utc::now();
        Ok(Execution {
            id: Uuid::new_v4(),
            organization_id: self.organization_id,
            workflow_id: self.workflow_id,
            status: ExecutionStatus::Pending,
            input: self.input.clone(),
            output: None,
            error: None,
            context: self.context.clone(),
            trigger_id: self.trigger_id,
            principal_id: self.principal_id,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            metrics: ExecutionMetrics::default(),
            retry_count: self.retry_count + 1,
            max_retries: self.max_retries,
            parent_execution_id: Some(self.id),
            deadline: now + chrono::Duration::seconds(DEFAULT_EXECUTION_TIMEOUT_SECS),
            metadata: self.metadata.clone(),
            version: 0,
        })
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub node_type: String,
    pub step_number: u32,
    pub status: StepStatus,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<ExecutionError>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub retry_count: u32,
}

impl ExecutionStep {
    pub fn new(execution_id: Uuid, node_id: impl Into<String>, node_type: impl Into<String>, step_number: u32, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            node_id: node_id.into(),
            node_type: node_type.into(),
            step_number,
            status: StepStatus::Pending,
            input,
            output: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            retry_count: 0,
        }
    }

    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, output: serde_json::Value) {
        let now = Utc::now();
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn fail(&mut self, error: ExecutionError) {
        let now = Utc::now();
        self.status = StepStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn skip(&mut self) {
        self.status = StepStatus::Skipped;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Option<Uuid>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionLog {
    pub fn new(execution_id: Uuid, step_id: Option<Uuid>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_id,
            level,
            message: message.into(),
            details: serde_json::json!({}),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut e = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        assert_eq!(e.status, ExecutionStatus::Pending);
        e.start().unwrap();
        assert_eq!(e.status, ExecutionStatus::Running);
        e.complete(serde_json::json!({"ok": true})).unwrap();
        assert_eq!(e.status, ExecutionStatus::Completed);
        assert!(e.completed_at.unwrap() >= e.started_at.unwrap());
        assert!(e.duration_ms.unwrap() >= 0);
    }

    #[test]
    fn cannot_start_twice() {
        let mut e = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        e.start().unwrap();
        assert!(e.start().is_err());
    }

    #[test]
    fn retry_preserves_input_and_links_parent() {
        let mut e = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({"k": "v"}), None, None);
        e.start().unwrap();
        e.fail(ExecutionError::new("upstream_failure", "boom")).unwrap();
        let child = e.retry().unwrap();
        assert_eq!(child.parent_execution_id, Some(e.id));
        assert_eq!(child.retry_count, 1);
        assert_eq!(child.input, e.input);
        assert_eq!(child.trigger_id, e.trigger_id);
        assert_eq!(child.status, ExecutionStatus::Pending);
    }

    #[test]
    fn retry_exhausted_rejected() {
        let mut e = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        e.max_retries = 1;
        e.retry_count = 1;
        e.start().unwrap();
        e.fail(ExecutionError::new("timeout", "x")).unwrap();
        assert!(e.retry().is_err());
    }

    #[test]
    fn cancel_valid_from_paused() {
        let mut e = Execution::submit(Uuid::new_v4(), Uuid::new_v4(), serde_json::json!({}), None, None);
        e.start().unwrap();
        e.pause().unwrap();
        e.cancel().unwrap();
        assert_eq!(e.status, ExecutionStatus::Cancelled);
    }

    #[test]
    fn step_numbers_and_terminal_status() {
        let exec_id = Uuid::new_v4();
        let mut step = ExecutionStep::new(exec_id, "a", "variable", 1, serde_json::json!({}));
        assert!(!step.is_terminal());
        step.start();
        step.complete(serde_json::json!({"y": "ok"}));
        assert!(step.is_terminal());
        assert_eq!(step.step_number, 1);
    }
}
