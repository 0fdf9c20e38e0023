//! Core data model, error taxonomy, and trait seams for the FlowPilot
//! workflow execution engine: the multi-tenant enforcement plane
//! (organizations, roles, memberships, quotas) and the declarative workflow
//! graph (nodes, edges, variables, triggers, executions) every other crate
//! in this workspace builds on.

pub mod audit;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod execution;
pub mod node;
pub mod quota;
pub mod tenancy;
pub mod traits;
pub mod workflow;

pub use audit::{AuditEventKind, AuditLog, AuditOutcome, LoginAttemptWindow};
pub use cache::{prompt_hash, AiRequest, SemanticCacheEntry};
pub use config::EngineConfig;
pub use document::{Document, DocumentExtraction, DocumentPage, DocumentStatus};
pub use error::{Error, Result};
pub use execution::{
    Execution, ExecutionError, ExecutionLog, ExecutionMetrics, ExecutionStatus, ExecutionStep,
    LogLevel, StepStatus,
};
pub use node::{Edge, GraphDefinition, Node, NodeKind};
pub use quota::{QuotaPeriod, ResourceKind, UsageEvent, UsageQuota};
pub use tenancy::{
    authorize, resolve_organization_context, ApiKey, Department, Invitation, InvitationStatus,
    Membership, Organization, PermissionMap, Principal, Role, RoleKind,
};
pub use traits::{
    AiClient, AiGeneration, AuditStore, CacheStore, ConnectorClient, ExecutionStore,
    HandlerContext, NodeHandler, Notifier, TenancyStore, UsageStore, WorkflowFilter, WorkflowStore,
};
pub use tokio_util::sync::CancellationToken;
pub use workflow::{
    create_version, validate_definition, validate_variable_defaults, TriggerKind, VariableScope,
    VariableType, Workflow, WorkflowStats, WorkflowStatus, WorkflowTrigger, WorkflowVariable,
    WorkflowVersion,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
