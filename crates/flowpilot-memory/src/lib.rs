//! FlowPilot Memory - lock-free concurrent persistence backends for the
//! workflow engine's state.
//!
//! Each store ships two implementations:
//!
//! - **InMemory\*Store**: DashMap-backed, cleared on restart.
//! - **File\*Store**: wraps the in-memory store, loads a JSON snapshot on
//!   construction and re-serializes the full snapshot after every mutating
//!   call.

pub mod audit_store;
pub mod cache_store;
pub mod execution_store;
pub mod tenancy_store;
pub mod usage_store;
pub mod workflow_store;

pub use audit_store::{FileAuditStore, InMemoryAuditStore};
pub use cache_store::{FileCacheStore, InMemoryCacheStore};
pub use execution_store::{FileExecutionStore, InMemoryExecutionStore};
pub use tenancy_store::{FileTenancyStore, InMemoryTenancyStore};
pub use usage_store::{FileUsageStore, InMemoryUsageStore};
pub use workflow_store::{FileWorkflowStore, InMemoryWorkflowStore};
