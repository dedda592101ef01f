//! Re-applying a stored snapshot to the host.

use prosper_types::{StoredCell, VariableId};
use serde::Serialize;

use crate::error::BridgeError;
use crate::session::{Connector, Session};

/// Outcome of [`apply_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Values written to the host.
    pub applied: usize,
    /// Cells with nothing to write (not sampled or missing).
    pub skipped: usize,
    /// Keys the host refused, or that are not valid identifiers.
    pub failed: Vec<String>,
}

/// Write every stored value back into the host.
///
/// Not-sampled and missing cells are skipped. A failed write is logged and
/// recorded in the report; the remaining cells are still applied.
///
/// # Errors
///
/// Returns [`BridgeError::Closed`] or [`BridgeError::Poisoned`] if the
/// session itself is unusable.
pub fn apply_snapshot<C, I, K>(
    session: &mut Session<'_, C>,
    cells: I,
) -> Result<ApplyReport, BridgeError>
where
    C: Connector,
    I: IntoIterator<Item = (K, StoredCell)>,
    K: AsRef<str>,
{
    let mut report = ApplyReport::default();

    for (key, cell) in cells {
        let key = key.as_ref();
        let Some(value) = cell.as_value() else {
            report.skipped = report.skipped.saturating_add(1);
            continue;
        };

        let variable = match VariableId::parse(key) {
            Ok(variable) => variable,
            Err(err) => {
                tracing::warn!(key, error = %err, "Stored key is not a variable, skipping");
                report.failed.push(key.to_owned());
                continue;
            }
        };

        match session.set(&variable, value) {
            Ok(()) => report.applied = report.applied.saturating_add(1),
            Err(err @ (BridgeError::Closed | BridgeError::Poisoned)) => return Err(err),
            Err(err) => {
                tracing::warn!(variable = %variable, error = %err, "Variable write failed");
                report.failed.push(key.to_owned());
            }
        }
    }

    tracing::info!(
        applied = report.applied,
        skipped = report.skipped,
        failed = report.failed.len(),
        "Snapshot applied"
    );
    Ok(report)
}
