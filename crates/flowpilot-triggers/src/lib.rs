//! Trigger dispatch (§4.3): the four ways a workflow becomes a submitted
//! execution — `manual` (direct API call), `scheduled` (cron scanner),
//! `webhook` (inbound HTTP), and `event` (internal pub/sub) — all funneled
//! through the same [`TriggerDispatcher`] onto `flowpilot-runtime`'s
//! `ExecutionScheduler`, so non-overlapping concurrency and workflow
//! active-flag enforcement apply uniformly regardless of entry point.

pub mod dispatcher;
pub mod event;
pub mod scheduled;
pub mod webhook;

pub use dispatcher::TriggerDispatcher;
pub use event::publish_event;
pub use scheduled::CronScanner;
pub use webhook::{verify_webhook_signature, WebhookLookup};
