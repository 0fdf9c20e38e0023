//! `ConnectorClient` and `Notifier` implementations for the `connector_*`
//! and `email` node handlers.
//!
//! Actual delivery of email/Slack messages is out of scope — the
//! [`Notifier`] implementations here record and log sends rather than
//! placing them on the wire. Generic connector dispatch (`connector_*` node
//! type) is in scope and ships a real HTTP-based client alongside a fake
//! one for tests.

mod connector;
mod notifier;

pub use connector::{FakeConnectorClient, HttpConnectorClient, ProviderEndpoint};
pub use notifier::{FakeNotifier, RecordedNotification};
