//! Tenancy & Permission Gate, Execution Scheduler, DAG Runner, and Handler
//! Registry: the machinery every execution request passes through between
//! an inbound call and a persisted, observable record (§4.1, §4.4, §4.5,
//! §4.6 of the engine specification).
//!
//! `flowpilot-core` owns the data model and the trait seams; this crate
//! owns the behavior that sits on top of them, built from explicit structs
//! passed in by `Arc` rather than global singletons, per the Design Notes.

pub mod condition;
pub mod gate;
pub mod handlers;
pub mod metering;
pub mod registry;
pub mod runner;
pub mod scheduler;

pub use gate::{AuthOutcome, PermissionGate, QuotaHeaders, RouteClass};
pub use metering::{PricingTable, UsageMeter};
pub use registry::HandlerRegistry;
pub use runner::DagRunner;
pub use scheduler::{ExecutionScheduler, SchedulerHandle};
