//! Model history store for the Prosper model-history workspace.
//!
//! One `SQLite` file holds one table per tracked entity. Each table is keyed
//! by variable name and grows one text column per snapshot, so a row reads
//! as that variable's history and a column reads as one complete model
//! state.
//!
//! # Architecture
//!
//! ```text
//! capture --> write_snapshot ---> [ entity table: key | S1 | S2 | ... ]
//!                                      |                      |
//!                    read_snapshot <---+    read_series <-----+
//!                 (restore a model)          (report history)
//! ```
//!
//! Every operation opens its own connection and closes it before
//! returning; no handle to the file is held in between.
//!
//! # Modules
//!
//! - [`sqlite`] -- Store configuration and transient connections
//! - [`history_store`] -- Snapshot writes, snapshot and series reads, catalog
//! - [`error`] -- Shared error types

pub mod error;
pub mod history_store;
pub mod sqlite;

// Re-export primary types for convenience.
pub use error::HistoryError;
pub use history_store::{HistoryStore, SeriesPoint, SkippedPair, WriteReport};
pub use sqlite::{DEFAULT_KEY_COLUMN, StoreConfig};
