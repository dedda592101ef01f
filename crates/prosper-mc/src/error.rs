//! Error types for the `prosper-mc` binary.
//!
//! [`CliError`] wraps every failure a subcommand can hit so `run` can
//! propagate with `?`.

/// Top-level error for the `prosper-mc` binary.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: prosper_core::ConfigError,
    },

    /// A workflow failed.
    #[error("{source}")]
    Workflow {
        /// The underlying workflow error.
        #[from]
        source: prosper_core::WorkflowError,
    },

    /// A direct store query failed.
    #[error("history store error: {source}")]
    History {
        /// The underlying store error.
        #[from]
        source: prosper_history::HistoryError,
    },

    /// A command-line argument failed validation.
    #[error("invalid argument: {source}")]
    Argument {
        /// The underlying validation error.
        #[from]
        source: prosper_types::TypeError,
    },

    /// A report could not be rendered.
    #[error("failed to render output: {source}")]
    Output {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
