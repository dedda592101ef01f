//! Append-only wide-table history per entity.
//!
//! Each entity (a well or a model) owns one table. Rows are variables,
//! keyed by their upper-cased name in a unique key column; every snapshot
//! adds one text column. The schema only grows:
//!
//! ```text
//! ABSENT --write--> (key, S1) --write S2--> (key, S1, S2) --> ...
//! ```
//!
//! Writing a label that already exists overwrites that column's cells for
//! the supplied keys, so re-running a write is idempotent. Rows added by a
//! later snapshot read back as [`StoredCell::Missing`] in earlier columns.

use std::collections::BTreeMap;

use prosper_types::{CellValue, EntityName, SnapshotLabel, StoredCell};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Connection, Row};

use crate::error::HistoryError;
use crate::sqlite::{OpenMode, StoreConfig, open, quote_ident};

/// Operations on the per-entity history tables of one store file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    config: StoreConfig,
}

/// Outcome of one [`HistoryStore::write_snapshot`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// The entity table did not exist and was created.
    pub created_table: bool,
    /// The snapshot column did not exist and was added.
    pub added_column: bool,
    /// Number of pairs whose cell was written.
    pub written: usize,
    /// Pairs that were left out of the snapshot.
    pub skipped: Vec<SkippedPair>,
}

/// A pair that could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPair {
    /// The key as supplied by the caller.
    pub key: String,
    /// Why it was skipped.
    pub reason: String,
}

/// One snapshot's cell for one variable, in column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    /// The snapshot column name.
    pub label: String,
    /// The stored cell.
    pub cell: StoredCell,
}

impl HistoryStore {
    /// Create a store handle. Nothing is opened until the first operation.
    pub const fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    /// The store configuration.
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Record one snapshot for `entity` under column `label`.
    ///
    /// Creates the store file and the entity table as needed, adds the
    /// column if it is new, then for each pair inserts the key row if absent
    /// (never overwriting the key) and sets the cell. Keys are trimmed and
    /// upper-cased. A pair whose key is blank or whose value has no text
    /// form is skipped, logged and reported; the rest of the batch is still
    /// written. Everything commits in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::LabelCollidesWithKey`] if `label` names the
    /// key column, [`HistoryError::KeyColumnMismatch`] if an existing table
    /// lacks the key column, [`HistoryError::CaseConflict`] if `entity` or
    /// `label` differs only in case from an existing table or column, and [`HistoryError::Sqlite`] if the store
    /// cannot be opened or committed.
    pub async fn write_snapshot<I, K>(
        &self,
        entity: &EntityName,
        label: &SnapshotLabel,
        pairs: I,
    ) -> Result<WriteReport, HistoryError>
    where
        I: IntoIterator<Item = (K, CellValue)>,
        K: AsRef<str>,
    {
        let key_column = self.config.key_column.as_str();
        if label.as_str().eq_ignore_ascii_case(key_column) {
            return Err(HistoryError::LabelCollidesWithKey {
                label: label.to_string(),
            });
        }

        let mut conn = open(&self.config, OpenMode::CreateIfMissing).await?;
        let mut tx = conn.begin().await?;
        let mut report = WriteReport::default();

        let table = quote_ident(entity.as_str());
        let key_ident = quote_ident(key_column);
        let column = quote_ident(label.as_str());

        let columns = table_columns(&mut *tx, entity).await?;
        if columns.is_empty() {
            tracing::info!(%entity, %label, "Entity table does not exist, creating it");
            sqlx::query(&format!(
                "CREATE TABLE {table} ({key_ident} TEXT UNIQUE, {column} TEXT)"
            ))
            .execute(&mut *tx)
            .await?;
            report.created_table = true;
        } else {
            if !contains_column(&columns, key_column) {
                return Err(HistoryError::KeyColumnMismatch {
                    entity: entity.to_string(),
                    key_column: key_column.to_owned(),
                });
            }
            if find_label_column(&columns, label)?.is_some() {
                tracing::info!(%entity, %label, "Snapshot column exists, updating it");
            } else {
                tracing::info!(%entity, %label, "Adding snapshot column");
                sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} TEXT"))
                    .execute(&mut *tx)
                    .await?;
                report.added_column = true;
            }
        }

        let insert_sql = format!("INSERT OR IGNORE INTO {table} ({key_ident}) VALUES (?1)");
        let update_sql = format!("UPDATE {table} SET {column} = ?1 WHERE {key_ident} = ?2");

        for (raw_key, value) in pairs {
            let raw_key = raw_key.as_ref();
            let Some(key) = normalize_key(raw_key) else {
                tracing::warn!(%entity, %label, key = raw_key, "Skipping pair with blank key");
                report.skipped.push(SkippedPair {
                    key: raw_key.to_owned(),
                    reason: "blank key".to_owned(),
                });
                continue;
            };

            let text = match value.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(%entity, %label, key = key.as_str(), error = %e, "Skipping unserializable value");
                    report.skipped.push(SkippedPair {
                        key: raw_key.to_owned(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            sqlx::query(&insert_sql)
                .bind(&key)
                .execute(&mut *tx)
                .await?;
            sqlx::query(&update_sql)
                .bind(&text)
                .bind(&key)
                .execute(&mut *tx)
                .await?;
            report.written = report.written.saturating_add(1);
        }

        tx.commit().await?;
        conn.close().await?;

        tracing::debug!(
            %entity,
            %label,
            written = report.written,
            skipped = report.skipped.len(),
            created_table = report.created_table,
            added_column = report.added_column,
            "Wrote snapshot"
        );
        Ok(report)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read every variable's cell in snapshot `label`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::StoreNotFound`],
    /// [`HistoryError::TableNotFound`] or [`HistoryError::ColumnNotFound`]
    /// if the snapshot does not exist, and [`HistoryError::Sqlite`] if the
    /// query fails.
    pub async fn read_snapshot(
        &self,
        entity: &EntityName,
        label: &SnapshotLabel,
    ) -> Result<BTreeMap<String, StoredCell>, HistoryError> {
        let mut conn = open(&self.config, OpenMode::ExistingOnly).await?;

        let columns = existing_columns(&mut conn, entity).await?;
        if find_label_column(&columns, label)?.is_none() {
            return Err(HistoryError::ColumnNotFound {
                entity: entity.to_string(),
                label: label.to_string(),
            });
        }

        let rows = sqlx::query(&format!(
            "SELECT {key}, {column} FROM {table} ORDER BY rowid",
            key = quote_ident(&self.config.key_column),
            column = quote_ident(label.as_str()),
            table = quote_ident(entity.as_str()),
        ))
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let key: Option<String> = row.try_get(0)?;
            let cell: Option<String> = row.try_get(1)?;
            if let Some(key) = key {
                snapshot.insert(key, StoredCell::from_column(cell));
            }
        }

        tracing::debug!(%entity, %label, rows = snapshot.len(), "Read snapshot");
        Ok(snapshot)
    }

    /// Read one variable's cell in every snapshot, in column-creation order.
    ///
    /// Sentinel and null cells are kept as [`StoredCell::NotSampled`] and
    /// [`StoredCell::Missing`] so the result stays index-aligned with
    /// [`HistoryStore::list_snapshots`].
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::KeyNotFound`] if the variable has no row,
    /// the table lookup errors of [`HistoryStore::read_snapshot`], and
    /// [`HistoryError::Sqlite`] if the query fails.
    pub async fn read_series_aligned(
        &self,
        entity: &EntityName,
        key: &str,
    ) -> Result<Vec<SeriesPoint>, HistoryError> {
        let key_column = self.config.key_column.as_str();
        let normalized = normalize_key(key).ok_or_else(|| HistoryError::KeyNotFound {
            entity: entity.to_string(),
            key: key.to_owned(),
        })?;

        let mut conn = open(&self.config, OpenMode::ExistingOnly).await?;
        let columns = existing_columns(&mut conn, entity).await?;
        let snapshots: Vec<String> = columns
            .into_iter()
            .filter(|c| !c.eq_ignore_ascii_case(key_column))
            .collect();

        if snapshots.is_empty() {
            conn.close().await?;
            return Ok(Vec::new());
        }

        let select_list = snapshots
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let row = sqlx::query(&format!(
            "SELECT {select_list} FROM {table} WHERE {key_ident} = ?1",
            table = quote_ident(entity.as_str()),
            key_ident = quote_ident(key_column),
        ))
        .bind(&normalized)
        .fetch_optional(&mut conn)
        .await?;
        conn.close().await?;

        let Some(row) = row else {
            return Err(HistoryError::KeyNotFound {
                entity: entity.to_string(),
                key: normalized,
            });
        };

        let mut points = Vec::with_capacity(snapshots.len());
        for (index, label) in snapshots.into_iter().enumerate() {
            let cell: Option<String> = row.try_get(index)?;
            points.push(SeriesPoint {
                label,
                cell: StoredCell::from_column(cell),
            });
        }
        Ok(points)
    }

    /// Read one variable's numeric history, in snapshot order.
    ///
    /// Snapshots where the variable was not sampled, or did not exist yet,
    /// are left out, so the result holds one value per snapshot that
    /// recorded a number. Use [`HistoryStore::read_series_aligned`] when
    /// positions must match snapshot indices.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Parse`] if a cell holds text that is neither
    /// numeric nor the "not sampled" marker, plus the errors of
    /// [`HistoryStore::read_series_aligned`].
    pub async fn read_series(
        &self,
        entity: &EntityName,
        key: &str,
    ) -> Result<Vec<f64>, HistoryError> {
        let points = self.read_series_aligned(entity, key).await?;
        let mut values = Vec::with_capacity(points.len());
        for point in points {
            let number = point.cell.to_number().map_err(|source| HistoryError::Parse {
                entity: entity.to_string(),
                key: key.trim().to_uppercase(),
                label: point.label.clone(),
                source,
            })?;
            if let Some(number) = number {
                values.push(number);
            }
        }
        Ok(values)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// List the entities that have a history table, sorted by name.
    ///
    /// A store that does not exist yet has no entities. Tables whose names
    /// are not valid entity names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::Sqlite`] if the query fails.
    pub async fn list_entities(&self) -> Result<Vec<EntityName>, HistoryError> {
        let mut conn = match open(&self.config, OpenMode::ExistingOnly).await {
            Ok(conn) => conn,
            Err(HistoryError::StoreNotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
             ORDER BY name",
        )
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        Ok(names
            .iter()
            .filter_map(|name| EntityName::parse(name).ok())
            .collect())
    }

    /// List the snapshot labels of `entity`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the table lookup errors of [`HistoryStore::read_snapshot`].
    pub async fn list_snapshots(
        &self,
        entity: &EntityName,
    ) -> Result<Vec<SnapshotLabel>, HistoryError> {
        let key_column = self.config.key_column.as_str();
        let mut conn = open(&self.config, OpenMode::ExistingOnly).await?;
        let columns = existing_columns(&mut conn, entity).await?;
        conn.close().await?;

        Ok(columns
            .iter()
            .filter(|c| !c.eq_ignore_ascii_case(key_column))
            .filter_map(|c| match SnapshotLabel::parse(c) {
                Ok(label) => Some(label),
                Err(e) => {
                    tracing::warn!(%entity, column = c.as_str(), error = %e, "Ignoring foreign column");
                    None
                }
            })
            .collect())
    }

    /// List the variable keys of `entity`, in the order they were first
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns the table lookup errors of [`HistoryStore::read_snapshot`].
    pub async fn list_keys(&self, entity: &EntityName) -> Result<Vec<String>, HistoryError> {
        let mut conn = open(&self.config, OpenMode::ExistingOnly).await?;
        existing_columns(&mut conn, entity).await?;

        let keys: Vec<Option<String>> = sqlx::query_scalar(&format!(
            "SELECT {key} FROM {table} ORDER BY rowid",
            key = quote_ident(&self.config.key_column),
            table = quote_ident(entity.as_str()),
        ))
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        Ok(keys.into_iter().flatten().collect())
    }
}

/// Column names of the entity table in creation order; empty if the table
/// does not exist.
///
/// `SQLite` resolves table names without regard to case, so a table whose
/// stored name differs from `entity` only in case is a conflict, not a match.
async fn table_columns(
    conn: &mut SqliteConnection,
    entity: &EntityName,
) -> Result<Vec<String>, HistoryError> {
    let stored: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
    )
    .bind(entity.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match stored {
        None => return Ok(Vec::new()),
        Some(existing) if existing != entity.as_str() => {
            return Err(HistoryError::CaseConflict {
                kind: "entity",
                name: entity.to_string(),
                existing,
            });
        }
        Some(_) => {}
    }

    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .bind(entity.as_str())
            .fetch_all(&mut *conn)
            .await?;
    Ok(columns)
}

/// Like [`table_columns`], but a missing table is an error.
async fn existing_columns(
    conn: &mut SqliteConnection,
    entity: &EntityName,
) -> Result<Vec<String>, HistoryError> {
    let columns = table_columns(conn, entity).await?;
    if columns.is_empty() {
        return Err(HistoryError::TableNotFound {
            entity: entity.to_string(),
        });
    }
    Ok(columns)
}

/// `SQLite` column names are case-insensitive.
fn contains_column(columns: &[String], name: &str) -> bool {
    columns.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// The existing column for `label`, matched exactly.
///
/// A column that differs from `label` only in case is the same column to
/// `SQLite` and is reported as a conflict.
fn find_label_column<'c>(
    columns: &'c [String],
    label: &SnapshotLabel,
) -> Result<Option<&'c str>, HistoryError> {
    match columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(label.as_str()))
    {
        Some(existing) if existing != label.as_str() => Err(HistoryError::CaseConflict {
            kind: "snapshot label",
            name: label.to_string(),
            existing: existing.clone(),
        }),
        found => Ok(found.map(String::as_str)),
    }
}

/// Trim and upper-case a variable key; `None` if nothing is left.
fn normalize_key(key: &str) -> Option<String> {
    let key = key.trim();
    (!key.is_empty()).then(|| key.to_uppercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_normalized() {
        assert_eq!(normalize_key(" a.x \n").as_deref(), Some("A.X"));
        assert_eq!(normalize_key("   "), None);
    }

    #[test]
    fn column_lookup_ignores_case() {
        let columns = vec!["osString".to_owned(), "Update_1".to_owned()];
        assert!(contains_column(&columns, "UPDATE_1"));
        assert!(!contains_column(&columns, "Update_2"));
    }

    #[test]
    fn label_lookup_is_exact_and_flags_case_variants() {
        let columns = vec!["osString".to_owned(), "Update_1".to_owned()];
        let exact = SnapshotLabel::parse("Update_1").unwrap();
        assert_eq!(find_label_column(&columns, &exact).unwrap(), Some("Update_1"));
        let absent = SnapshotLabel::parse("Update_2").unwrap();
        assert_eq!(find_label_column(&columns, &absent).unwrap(), None);
        let variant = SnapshotLabel::parse("UPDATE_1").unwrap();
        assert!(matches!(
            find_label_column(&columns, &variant),
            Err(HistoryError::CaseConflict { kind: "snapshot label", .. })
        ));
    }

    #[test]
    fn write_report_serializes() {
        let report = WriteReport {
            created_table: true,
            added_column: false,
            written: 2,
            skipped: vec![SkippedPair {
                key: "A.Z".to_owned(),
                reason: "non-finite number NaN cannot be stored".to_owned(),
            }],
        };
        let json = serde_json::to_value(&report).unwrap_or_default();
        assert_eq!(json["written"], 2);
        assert_eq!(json["skipped"][0]["key"], "A.Z");
    }
}
