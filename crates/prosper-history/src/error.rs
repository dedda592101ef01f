//! Error types for the history store.
//!
//! All errors are propagated via [`HistoryError`], which wraps the underlying
//! [`sqlx`] and I/O errors with context about which table, column or key
//! was involved. Per-pair serialization failures during a write are not
//! errors: they are collected in [`crate::WriteReport::skipped`].

use std::path::PathBuf;

use prosper_types::TypeError;

/// Errors that can occur in the history store.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The backing file could not be opened, queried or committed.
    #[error("store I/O error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A filesystem check on the store path failed.
    #[error("store filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// A read was requested from a store file that does not exist yet.
    #[error("history store {} does not exist", path.display())]
    StoreNotFound {
        /// Path of the missing store file.
        path: PathBuf,
    },

    /// The entity has no history table.
    #[error("no history table for entity {entity}")]
    TableNotFound {
        /// The entity that was looked up.
        entity: String,
    },

    /// The entity table has no column for the requested snapshot.
    #[error("entity {entity} has no snapshot {label}")]
    ColumnNotFound {
        /// The entity that was looked up.
        entity: String,
        /// The snapshot label that is missing.
        label: String,
    },

    /// The entity table has no row for the requested variable.
    #[error("entity {entity} has no variable {key}")]
    KeyNotFound {
        /// The entity that was looked up.
        entity: String,
        /// The normalised variable key.
        key: String,
    },

    /// An existing entity table does not carry the configured key column.
    #[error("table {entity} has no key column {key_column}")]
    KeyColumnMismatch {
        /// The entity whose table was inspected.
        entity: String,
        /// The configured key column name.
        key_column: String,
    },

    /// A snapshot label would shadow the key column.
    #[error("snapshot label {label} collides with the key column")]
    LabelCollidesWithKey {
        /// The rejected label.
        label: String,
    },

    /// A name differs only in letter case from an existing table or
    /// column, which `SQLite` would treat as the same identifier.
    #[error("{kind} {name} differs only in case from existing {existing}")]
    CaseConflict {
        /// Which kind of name clashed (`entity` or `snapshot label`).
        kind: &'static str,
        /// The requested name.
        name: String,
        /// The name already in the store.
        existing: String,
    },

    /// A stored cell could not be parsed as a number.
    #[error("cannot parse {entity}.{key} at {label}: {source}")]
    Parse {
        /// The entity that was read.
        entity: String,
        /// The variable key that was read.
        key: String,
        /// The snapshot whose cell failed to parse.
        label: String,
        /// The underlying conversion error.
        source: TypeError,
    },

    /// Invalid store configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HistoryError {
    /// Whether this error reports a missing table, column or key rather
    /// than an I/O or parse failure.
    pub const fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::StoreNotFound { .. }
                | Self::TableNotFound { .. }
                | Self::ColumnNotFound { .. }
                | Self::KeyNotFound { .. }
                | Self::KeyColumnMismatch { .. }
                | Self::CaseConflict { .. }
        )
    }
}
