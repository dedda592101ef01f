//! Configuration and workflows for the Prosper model-history workspace.
//!
//! Ties the automation bridge to the history store: capture a model into a
//! snapshot, fabricate perturbed updates, restore an earlier state, and
//! report how variables evolved across snapshots.
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with environment overrides
//! - [`perturb`] -- Random scaling of captured values
//! - [`workflow`] -- Exercise, history initialisation, restore, host commands
//!   and reporting
//! - [`error`] -- Workflow error type

pub mod config;
pub mod error;
pub mod perturb;
pub mod workflow;

// Re-export primary types for convenience.
pub use config::{ConfigError, HistoryConfig};
pub use error::WorkflowError;
pub use perturb::{Perturbation, rng_from_seed};
pub use workflow::{
    CommandReport, ExerciseReport, KeySeries, ModelSnapshot, ReportPoint, SeriesReport,
    Workflows,
};
