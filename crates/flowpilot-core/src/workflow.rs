//! Workflows, versions, variables, triggers, and the graph validation rules
//! every create/update and pre-execution path runs through (§4.2).

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::node::GraphDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl VariableType {
    /// Whether `value`'s JSON shape matches this declared type.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            VariableType::String => value.is_string(),
            VariableType::Number => value.is_number(),
            VariableType::Boolean => value.is_boolean(),
            VariableType::Array => value.is_array(),
            VariableType::Object => value.is_object(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    Global,
    Local,
    Environment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableType,
    pub scope: VariableScope,
    pub default_value: Option<serde_json::Value>,
    pub required: bool,
    pub secret: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Manual,
    Scheduled,
    Webhook,
    Event,
}

/// Per-trigger concurrency policy (§4.4): `non_overlapping` caps concurrent
/// executions of this (workflow, trigger) pair at one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub kind: TriggerKind,
    #[serde(default)]
    pub config: serde_json::Value,
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub webhook_path: Option<String>,
    pub webhook_secret: Option<String>,
    pub event_type: Option<String>,
    pub event_filter: Option<serde_json::Value>,
    pub is_active: bool,
    pub non_overlapping: bool,
    pub execution_count: u64,
    pub last_triggered_at: Option<DateTime<Utc>>,
}

impl WorkflowTrigger {
    pub fn new_manual(workflow_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            name: name.into(),
            kind: TriggerKind::Manual,
            config: serde_json::json!({}),
            cron: None,
            timezone: None,
            webhook_path: None,
            webhook_secret: None,
            event_type: None,
            event_filter: None,
            is_active: true,
            non_overlapping: false,
            execution_count: 0,
            last_triggered_at: None,
        }
    }

    /// `kind=scheduled => cron present and parseable`.
    pub fn validate(&self) -> Result<()> {
        if self.kind == TriggerKind::Scheduled {
            let expr = self
                .cron
                .as_ref()
                .ok_or_else(|| Error::validation("scheduled trigger requires a cron expression"))?;
            expr.parse::<cron::Schedule>()
                .map_err(|e| Error::validation(format!("invalid cron expression: {e}")))?;
        }
        if self.kind == TriggerKind::Webhook && self.webhook_path.is_none() {
            return Err(Error::validation("webhook trigger requires a path"));
        }
        Ok(())
    }

    pub fn record_trigger(&mut self, at: DateTime<Utc>) {
        self.execution_count += 1;
        self.last_triggered_at = Some(at);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub execution_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub tags: Vec<String>,
    pub status: WorkflowStatus,
    pub is_active: bool,
    pub current_version: u32,
    /// Denormalized for fast reads; authoritative copy lives in the
    /// matching `WorkflowVersion` row.
    pub version: u32,
    pub definition: GraphDefinition,
    pub variables: Vec<WorkflowVariable>,
    pub stats: WorkflowStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(organization_id: Uuid, name: impl Into<String>, definition: GraphDefinition) -> Result<Self> {
        validate_definition(&definition)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            organization_id,
            name: name.into(),
            tags: Vec::new(),
            status: WorkflowStatus::Draft,
            is_active: false,
            current_version: 1,
            version: 1,
            definition,
            variables: Vec::new(),
            stats: WorkflowStats::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// `status=active => active-flag=true`.
    pub fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.is_active = status == WorkflowStatus::Active;
        self.updated_at = Utc::now();
    }

    pub fn record_submission(&mut self) {
        self.stats.execution_count += 1;
        self.stats.last_executed_at = Some(Utc::now());
    }

    pub fn record_success(&mut self) {
        self.stats.success_count += 1;
    }

    pub fn record_failure(&mut self) {
        self.stats.failure_count += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub workflow_id: Uuid,
    pub version: u32,
    pub definition: GraphDefinition,
    pub change_summary: Option<String>,
    pub author: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Applies `create_version`: a new immutable snapshot at `version + 1`.
/// Returns the new version record; the caller (the store) is responsible
/// for bumping `workflow.current_version`/`workflow.version` atomically
/// alongside persisting it.
pub fn create_version(
    workflow: &Workflow,
    definition: GraphDefinition,
    author: Option<Uuid>,
    change_summary: Option<String>,
) -> Result<WorkflowVersion> {
    validate_definition(&definition)?;
    Ok(WorkflowVersion {
        workflow_id: workflow.id,
        version: workflow.version + 1,
        definition,
        change_summary,
        author,
        created_at: Utc::now(),
    })
}

/// Validates the graph invariants from §4.2:
/// - unique, non-empty node ids
/// - edges reference existing node ids
/// - no directed cycles
///
/// Disconnected nodes are reported as warnings, never a hard failure.
pub fn validate_definition(def: &GraphDefinition) -> Result<Vec<String>> {
    let mut seen_ids = HashSet::new();
    for node in &def.nodes {
        if node.id.is_empty() {
            return Err(Error::validation("node id must not be empty"));
        }
        if node.type_name.is_empty() {
            return Err(Error::validation(format!("node {} has an empty type", node.id)));
        }
        if !seen_ids.insert(node.id.clone()) {
            return Err(Error::validation(format!("duplicate node id: {}", node.id)));
        }
    }

    for edge in &def.edges {
        if !seen_ids.contains(&edge.source) {
            return Err(Error::validation(format!(
                "edge {} references unknown source node {}",
                edge.id, edge.source
            )));
        }
        if !seen_ids.contains(&edge.target) {
            return Err(Error::validation(format!(
                "edge {} references unknown target node {}",
                edge.id, edge.target
            )));
        }
    }

    detect_cycle(def)?;

    Ok(find_unreachable_warnings(def))
}

fn detect_cycle(def: &GraphDefinition) -> Result<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &def.edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(Error::validation(format!(
                    "workflow graph contains a cycle through node {node}"
                )))
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(targets) = adjacency.get(node) {
            for &t in targets {
                visit(t, adjacency, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for node in &def.nodes {
        visit(node.id.as_str(), &adjacency, &mut marks)?;
    }
    Ok(())
}

/// Nodes unreachable from the entry set (nodes with no inbound edges) are
/// reported as warning strings, never rejected.
fn find_unreachable_warnings(def: &GraphDefinition) -> Vec<String> {
    if def.nodes.is_empty() {
        return Vec::new();
    }
    let has_inbound: HashSet<&str> = def.edges.iter().map(|e| e.target.as_str()).collect();
    let entry_nodes: Vec<&str> = def
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| !has_inbound.contains(id))
        .collect();

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &def.edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut reachable: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = entry_nodes.into_iter().collect();
    while let Some(n) = queue.pop_front() {
        if !reachable.insert(n) {
            continue;
        }
        if let Some(targets) = adjacency.get(n) {
            for &t in targets {
                queue.push_back(t);
            }
        }
    }

    def.nodes
        .iter()
        .filter(|n| !reachable.contains(n.id.as_str()))
        .map(|n| format!("node {} is not reachable from any entry node", n.id))
        .collect()
}

/// Required variables without a default must be satisfied by execution
/// input; this only checks the declaration itself, not a specific input.
pub fn validate_variable_defaults(variables: &[WorkflowVariable]) -> Result<()> {
    let mut names = HashSet::new();
    for var in variables {
        if !names.insert(var.name.clone()) {
            return Err(Error::validation(format!("duplicate variable name: {}", var.name)));
        }
        if let Some(default) = &var.default_value {
            if !var.var_type.matches(default) {
                return Err(Error::validation(format!(
                    "variable {} default value does not match declared type",
                    var.name
                )));
            }
        } else if var.required {
            // No default: acceptable only if the value is supplied at
            // execution time, which is checked against actual input, not
            // here.
        }
    }
    Ok(())
}
