//! Automation bridge for the Prosper model-history workspace.
//!
//! Talks to the engineering applications through their automation server:
//! reads a list of variables into a snapshot, writes a stored snapshot back,
//! opens model files and waits out long-running commands.
//!
//! # Architecture
//!
//! ```text
//! Connector --connect--> Session (RAII) --get/set/command--> AutomationServer
//!                           |
//!                           +-- capture_snapshot (variable list + filter)
//!                           +-- apply_snapshot   (stored cells)
//!                           +-- run_slow_command --> wait_for_completion
//! ```
//!
//! # Modules
//!
//! - [`session`] -- Server and connector traits, scoped sessions
//! - [`wait`] -- Bounded poll-with-backoff for asynchronous commands
//! - [`capture`] -- Variable lists, filters and snapshot capture
//! - [`apply`] -- Writing stored snapshots back to the host
//! - [`simulated`] -- In-process host used by tests and offline runs
//! - [`error`] -- Shared error types

pub mod apply;
pub mod capture;
pub mod error;
pub mod session;
pub mod simulated;
pub mod wait;

// Re-export primary types for convenience.
pub use apply::{ApplyReport, apply_snapshot};
pub use capture::{Capture, Filter, VariableList, capture_snapshot};
pub use error::BridgeError;
pub use session::{AutomationServer, Connector, Session, command_app};
pub use simulated::{SimulatedHost, SimulatedServer};
pub use wait::{BackoffPolicy, wait_for_completion};
