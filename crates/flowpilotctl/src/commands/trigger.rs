//! `trigger fire`: fires an already-stored `WorkflowTrigger` by name,
//! exercising the same [`flowpilot_triggers::TriggerDispatcher`] path a
//! cron tick or webhook request would.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use uuid::Uuid;

use crate::stores::{build_dispatcher, build_scheduler, EngineStores};

pub async fn fire(workflow_id: Uuid, trigger_name: &str, input: &str, data_dir: &Path, config_path: Option<&Path>) -> Result<()> {
    let input: serde_json::Value = serde_json::from_str(input).context("--input must be a JSON object")?;
    let config = crate::stores::load_config(config_path)?;
    let stores = EngineStores::open(data_dir).await?;

    let triggers = stores.workflow.list_triggers(workflow_id).await?;
    let trigger = triggers
        .into_iter()
        .find(|t| t.name == trigger_name)
        .ok_or_else(|| anyhow!("no trigger named '{trigger_name}' on workflow {workflow_id}"))?;

    let (scheduler, handle, workers) = build_scheduler(&stores, &config);
    let dispatcher = build_dispatcher(&stores, scheduler.clone(), handle);

    let execution = dispatcher.fire_trigger(trigger, input).await?;

    // `fire_trigger` only enqueues onto the worker pool; poll for the
    // worker to finish driving it rather than racing it with a second,
    // inline `drive` call.
    let finished = loop {
        let current = stores.execution.get_execution(execution.id).await?;
        if current.is_terminal() {
            break current;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    };

    println!("execution {} finished as {:?}", finished.id, finished.status);

    for worker in workers {
        worker.abort();
    }
    Ok(())
}
