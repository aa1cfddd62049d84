//! Event-correlation and debug-reporting engine for the Mobkoi analytics
//! adapter.
//!
//! The engine listens to the host framework's bid-lifecycle event stream,
//! correlates each event to its in-flight bid by a derived identifier,
//! accumulates a per-bid context of events and payload fragments, and
//! flushes one consolidated debug report per bid (plus orphan reports for
//! auction-wide failures) to a remote collector.
//!
//! # Modules
//!
//! - [`adapter`]: activation and per-event dispatch entry point
//! - [`context`]: per-bid aggregation unit
//! - [`coordinator`]: auction-scope routing, loss beacons, terminal flush
//! - [`error`]: error types
//! - [`events`]: debug events and the append-only event log
//! - [`identifiers`]: ortb-id / imp-id alias resolution
//! - [`logging`]: logging initialization
//! - [`payload`]: payload shape classification
//! - [`projection`]: per-shape field whitelists and deep-merge
//! - [`settings`]: configuration management and validation
//! - [`transport`]: collector/beacon network boundary
//! - [`test_support`]: testing utilities and mocks

pub mod adapter;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod identifiers;
pub mod logging;
pub mod payload;
pub mod projection;
pub mod settings;
pub mod transport;

pub use adapter::AnalyticsAdapter;
pub use error::AnalyticsError;
pub use events::{DebugEvent, EventKind, EventLog, EventType, Severity};
pub use payload::PayloadKind;
pub use settings::Settings;
pub use transport::Transport;
