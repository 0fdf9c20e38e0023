//! `workflow validate` / `workflow run`: load a workflow definition file
//! from disk and run it through the same graph validation and scheduler
//! path a stored, API-created workflow would go through.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use flowpilot_core::{GraphDefinition, Workflow, WorkflowStatus, WorkflowVariable};
use flowpilot_runtime::scheduler::run_inline;
use serde::Deserialize;

use crate::stores::{build_scheduler_only, EngineStores};

#[derive(Debug, Deserialize)]
struct WorkflowFile {
    name: String,
    #[serde(default)]
    variables: Vec<WorkflowVariable>,
    definition: GraphDefinition,
}

/// Parses `path` as YAML (or JSON, which is a YAML subset), reporting the
/// exact field path on a deserialization failure the way `aofctl`'s agent
/// config loader does.
fn load_workflow_file(path: &Path) -> Result<WorkflowFile> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize(deserializer)
        .map_err(|e| anyhow!("invalid workflow definition at `{}`: {} ({})", e.path(), e.inner(), path.display()))
}

pub async fn validate(file: &Path) -> Result<()> {
    let parsed = load_workflow_file(file)?;
    let warnings = flowpilot_core::validate_definition(&parsed.definition)?;
    flowpilot_core::validate_variable_defaults(&parsed.variables)?;

    println!("workflow '{}' is valid: {} node(s), {} edge(s)", parsed.name, parsed.definition.nodes.len(), parsed.definition.edges.len());
    for warning in &warnings {
        println!("warning: {warning}");
    }
    Ok(())
}

pub async fn run(file: &Path, input: &str, data_dir: &Path, config_path: Option<&Path>) -> Result<()> {
    let parsed = load_workflow_file(file)?;
    let input: serde_json::Value = serde_json::from_str(input).context("--input must be a JSON object")?;

    let config = crate::stores::load_config(config_path)?;
    let stores = EngineStores::open(data_dir).await?;

    let organization_id = uuid::Uuid::nil();
    let mut workflow = Workflow::new(organization_id, parsed.name, parsed.definition)?;
    workflow.variables = parsed.variables;
    workflow.set_status(WorkflowStatus::Active);
    let workflow = stores.workflow.create_workflow(workflow).await?;

    let scheduler = build_scheduler_only(&stores, &config);
    let finished = run_inline(&scheduler, &workflow, input).await?;

    println!("execution {} finished as {:?}", finished.id, finished.status);
    println!("{}", serde_json::to_string_pretty(&finished.output)?);

    match finished.status {
        flowpilot_core::ExecutionStatus::Completed => Ok(()),
        other => Err(anyhow!("execution ended in state {other:?}")),
    }
}
