//! Shared type definitions for the Prosper model-history workspace.
//!
//! Every value that crosses a crate boundary is validated once here and
//! carried as a typed value afterwards.
//!
//! # Modules
//!
//! - [`ids`] -- Variable identifiers, entity names, snapshot labels
//! - [`value`] -- Cell values written to and read from the history store
//! - [`label`] -- Strictly increasing snapshot label generation
//! - [`error`] -- Validation and conversion errors

pub mod error;
pub mod ids;
pub mod label;
pub mod value;

// Re-export all public types at crate root for convenience.
pub use error::TypeError;
pub use ids::{AppName, EntityName, SnapshotLabel, VariableId};
pub use label::LabelGenerator;
pub use value::{CellValue, MISSING, NOT_SAMPLED, StoredCell};
