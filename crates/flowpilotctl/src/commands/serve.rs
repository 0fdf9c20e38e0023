//! `flowpilotctl serve`: the engine-adjacent HTTP routes wired directly onto
//! `ExecutionScheduler`/`DagRunner`/`TriggerDispatcher`, the way
//! `test-trigger-server`'s axum binary wires directly onto `aof-triggers`/
//! `aof-runtime` types rather than standing up a full REST CRUD surface.

use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use flowpilot_core::{Error, ExecutionStore, ResourceKind, WorkflowStore};
use flowpilot_runtime::{ExecutionScheduler, QuotaHeaders, SchedulerHandle};
use flowpilot_triggers::{webhook, TriggerDispatcher};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::stores::{build_dispatcher, build_scheduler, EngineStores};

#[derive(Clone)]
struct AppState {
    scheduler: Arc<ExecutionScheduler>,
    dispatcher: Arc<TriggerDispatcher>,
    handle: SchedulerHandle,
    execution_store: Arc<dyn ExecutionStore>,
    workflow_store: Arc<dyn WorkflowStore>,
}

/// `{"success": true, "data": ...}` / `{"success": false, "error": {...}}`
/// envelope every route wraps its body in (§6), plus whatever headers that
/// route wants echoed alongside it (`X-Organization-ID`, `X-Quota-*`).
struct Envelope {
    result: Result<serde_json::Value, Error>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl Envelope {
    fn new(result: Result<serde_json::Value, Error>) -> Self {
        Self { result, headers: Vec::new() }
    }

    fn with_headers(result: Result<serde_json::Value, Error>, headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        Self { result, headers }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut response = match self.result {
            Ok(data) => (StatusCode::OK, Json(json!({"success": true, "data": data}))).into_response(),
            Err(err) => {
                let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let body = json!({
                    "success": false,
                    "error": {"code": err.code(), "message": err.to_string()},
                });
                (status, Json(body)).into_response()
            }
        };
        for (name, value) in self.headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}

/// `X-Quota-{Resource}-{Used,Limit}` header pair (§4.1 point 4, §6).
fn quota_header_pair(quota: QuotaHeaders) -> Vec<(HeaderName, HeaderValue)> {
    let resource = match quota.resource_kind {
        ResourceKind::Executions => "Executions",
        ResourceKind::ApiCalls => "Api-Calls",
        ResourceKind::AiTokens => "Ai-Tokens",
        ResourceKind::Documents => "Documents",
        ResourceKind::Storage => "Storage",
        ResourceKind::Members => "Members",
        ResourceKind::Workflows => "Workflows",
    };
    let used = HeaderName::from_bytes(format!("x-quota-{resource}-used").as_bytes()).expect("valid header name");
    let limit = HeaderName::from_bytes(format!("x-quota-{resource}-limit").as_bytes()).expect("valid header name");
    vec![
        (used, HeaderValue::from_str(&quota.used.to_string()).expect("valid header value")),
        (limit, HeaderValue::from_str(&quota.limit.to_string()).expect("valid header value")),
    ]
}

fn organization_id_value(organization_id: Uuid) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static("x-organization-id"), HeaderValue::from_str(&organization_id.to_string()).expect("uuid is valid header value"))
}

fn organization_id_header(headers: &HeaderMap) -> Result<Uuid, Error> {
    headers
        .get("X-Organization-ID")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::validation("missing X-Organization-ID header"))?
        .parse()
        .map_err(|_| Error::validation("X-Organization-ID is not a valid UUID"))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    input: serde_json::Value,
    #[serde(default)]
    principal_id: Option<Uuid>,
}

async fn execute_workflow(
    State(state): State<AppState>,
    AxumPath(workflow_id): AxumPath<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ExecuteRequest>,
) -> Envelope {
    let mut response_headers = Vec::new();
    let result = async {
        let organization_id = organization_id_header(&headers)?;
        response_headers.push(organization_id_value(organization_id));
        let execution = state.dispatcher.fire_manual(organization_id, workflow_id, body.input, body.principal_id).await?;
        if let Ok(quota) = state.scheduler.gate().quota_snapshot(organization_id, ResourceKind::Executions).await {
            response_headers.extend(quota_header_pair(quota));
        }
        Ok(json!({"execution_id": execution.id, "status": execution.status}))
    }
    .await;
    Envelope::with_headers(result, response_headers)
}

async fn get_execution(State(state): State<AppState>, AxumPath(execution_id): AxumPath<Uuid>) -> Envelope {
    let result = async {
        let execution = state.execution_store.get_execution(execution_id).await?;
        let steps = state.execution_store.list_steps(execution_id).await?;
        let logs = state.execution_store.list_logs(execution_id).await?;
        Ok(json!({"execution": execution, "steps": steps, "logs": logs}))
    }
    .await;
    Envelope::new(result)
}

async fn cancel_execution(State(state): State<AppState>, AxumPath(execution_id): AxumPath<Uuid>) -> Envelope {
    let result = async {
        let saved = state.scheduler.cancel_execution(execution_id).await?;
        Ok(json!({"execution": saved}))
    }
    .await;
    Envelope::new(result)
}

async fn retry_execution(State(state): State<AppState>, AxumPath(execution_id): AxumPath<Uuid>) -> Envelope {
    let result = async {
        let execution = state.execution_store.get_execution(execution_id).await?;
        let child = execution.retry()?;
        let child = state.execution_store.create_execution(child).await?;
        state.scheduler.workflow_store().get_workflow(child.organization_id, child.workflow_id).await?;
        state.handle.submit(child.id).await?;
        Ok(json!({"execution": child}))
    }
    .await;
    Envelope::new(result)
}

async fn fire_webhook(
    State(state): State<AppState>,
    AxumPath((workflow_id, token)): AxumPath<(Uuid, String)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Envelope {
    let result = async {
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        let signature = headers.get("X-Signature").and_then(|v| v.to_str().ok());
        let execution_id = webhook::handle_webhook(&state.dispatcher, workflow_id, &token, signature, payload, &body).await?;
        Ok(json!({"execution_id": execution_id}))
    }
    .await;
    Envelope::new(result)
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/workflows/:id/execute", post(execute_workflow))
        .route("/executions/:id", get(get_execution))
        .route("/executions/:id/cancel", post(cancel_execution))
        .route("/executions/:id/retry", post(retry_execution))
        .route("/webhooks/workflows/:id/:token", post(fire_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(bind: &str, data_dir: &std::path::Path, config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = crate::stores::load_config(config_path)?;
    let stores = EngineStores::open(data_dir).await?;
    let (scheduler, handle, _workers) = build_scheduler(&stores, &config);
    let dispatcher = build_dispatcher(&stores, scheduler.clone(), handle.clone());

    let state = AppState {
        scheduler,
        dispatcher,
        handle,
        execution_store: stores.execution.clone(),
        workflow_store: stores.workflow.clone(),
    };

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "flowpilotctl serve listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
