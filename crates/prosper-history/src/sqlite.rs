//! `SQLite` store configuration and transient connections.
//!
//! The store never holds a connection between operations. Every call opens
//! a fresh connection, runs its statements inside one transaction, commits
//! and closes, so external readers (reporting tools, a second process) only
//! ever contend for the file lock for the duration of one operation.
//!
//! Uses [`sqlx`] with runtime query construction. Table and column names
//! cannot be bound as parameters, so they are validated by
//! [`prosper_types`] and always emitted through [`quote_ident`]; values are
//! always bound.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};

use crate::error::HistoryError;

/// Default name of the column holding variable keys.
pub const DEFAULT_KEY_COLUMN: &str = "osString";

/// Default time to wait for a competing lock before failing.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Configuration for the history store file.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the `SQLite` file. Created on first write.
    pub path: PathBuf,
    /// Name of the unique key column in every entity table.
    pub key_column: String,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// Create a configuration for the store at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key_column: DEFAULT_KEY_COLUMN.to_owned(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    /// Use a different key column name.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Config`] if the name is not a valid column
    /// name.
    pub fn with_key_column(mut self, key_column: &str) -> Result<Self, HistoryError> {
        let column = prosper_types::SnapshotLabel::parse(key_column)
            .map_err(|e| HistoryError::Config(format!("invalid key column: {e}")))?;
        self.key_column = column.as_str().to_owned();
        Ok(self)
    }

    /// Set the lock wait timeout.
    #[must_use]
    pub const fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// The store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether the store may be created by this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenMode {
    /// Create the file if it does not exist (writes).
    CreateIfMissing,
    /// Fail if the file does not exist (reads).
    ExistingOnly,
}

/// Open a transient connection to the store.
///
/// Rollback journaling is used so the store stays a single file between
/// operations.
///
/// # Errors
///
/// Returns [`HistoryError::StoreNotFound`] when reading from a store that
/// does not exist, and [`HistoryError::Sqlite`] if the file cannot be
/// opened.
pub(crate) async fn open(
    config: &StoreConfig,
    mode: OpenMode,
) -> Result<SqliteConnection, HistoryError> {
    if mode == OpenMode::ExistingOnly && !tokio::fs::try_exists(&config.path).await? {
        return Err(HistoryError::StoreNotFound {
            path: config.path.clone(),
        });
    }

    let conn = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(mode == OpenMode::CreateIfMissing)
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(config.busy_timeout)
        .connect()
        .await?;

    tracing::trace!(path = %config.path.display(), ?mode, "Opened history store connection");
    Ok(conn)
}

/// Quote a table or column name for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
