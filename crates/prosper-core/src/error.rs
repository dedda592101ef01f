//! Error types for the model-history workflows.

use std::path::PathBuf;

use prosper_bridge::BridgeError;
use prosper_history::HistoryError;
use prosper_types::TypeError;

use crate::config::ConfigError;

/// Errors that abort a workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The history store failed.
    #[error("history store error: {source}")]
    History {
        /// The underlying store error.
        #[from]
        source: HistoryError,
    },

    /// The automation host failed.
    #[error("automation error: {source}")]
    Bridge {
        /// The underlying bridge error.
        #[from]
        source: BridgeError,
    },

    /// A name or value failed validation.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Scanning the models directory failed.
    #[error("cannot scan models in {}: {source}", dir.display())]
    ModelsDir {
        /// The directory being scanned.
        dir: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A report could not be serialized.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_errors_convert() {
        let err: WorkflowError = HistoryError::TableNotFound {
            entity: "WELL01".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("WELL01"));
    }

    #[test]
    fn models_dir_error_names_the_directory() {
        let err = WorkflowError::ModelsDir {
            dir: PathBuf::from("/field/models"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/field/models"));
    }
}
