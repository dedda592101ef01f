//! Variable lists and snapshot capture.
//!
//! A variable list is a text file with one identifier per line. Capturing
//! reads every listed variable that passes the [`Filter`] and marks the rest
//! as not sampled, so every snapshot has one entry per listed variable
//! unless the host refused to read it.

use std::path::Path;

use prosper_types::{CellValue, VariableId};

use crate::error::BridgeError;
use crate::session::{Connector, Session};

/// Ordered, validated list of variables to capture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableList {
    variables: Vec<VariableId>,
}

impl VariableList {
    /// Parse one identifier per line, skipping blank lines.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::VariableList`] naming the first line that is
    /// not a valid identifier.
    pub fn parse(text: &str) -> Result<Self, BridgeError> {
        let mut variables = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let variable = VariableId::parse(line).map_err(|source| BridgeError::VariableList {
                line: index.saturating_add(1),
                source,
            })?;
            variables.push(variable);
        }
        Ok(Self { variables })
    }

    /// Read and parse a variable list file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the file cannot be read, or the
    /// errors of [`VariableList::parse`].
    pub async fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let text = tokio::fs::read_to_string(path).await?;
        let list = Self::parse(&text)?;
        tracing::debug!(path = %path.display(), variables = list.len(), "Variable list loaded");
        Ok(list)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Iterate in file order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableId> {
        self.variables.iter()
    }
}

impl FromIterator<VariableId> for VariableList {
    fn from_iter<T: IntoIterator<Item = VariableId>>(iter: T) -> Self {
        Self {
            variables: iter.into_iter().collect(),
        }
    }
}

/// Substring allow-list deciding which variables are actually read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    patterns: Vec<String>,
}

impl Filter {
    /// Build a filter from substrings. Matching is case-insensitive.
    ///
    /// An empty filter matches nothing.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// A filter that matches every variable.
    pub fn all() -> Self {
        Self {
            patterns: vec![".".to_owned()],
        }
    }

    /// Whether any pattern occurs in `variable`.
    pub fn matches(&self, variable: &VariableId) -> bool {
        self.patterns
            .iter()
            .any(|pattern| variable.as_str().contains(pattern.as_str()))
    }
}

/// The result of one capture: values in variable-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capture {
    entries: Vec<(VariableId, CellValue)>,
    failed: Vec<VariableId>,
}

impl Capture {
    /// Value captured for `variable`.
    pub fn get(&self, variable: &VariableId) -> Option<&CellValue> {
        self.entries
            .iter()
            .find(|(id, _)| id == variable)
            .map(|(_, value)| value)
    }

    /// Mutable access to the value captured for `variable`.
    pub fn get_mut(&mut self, variable: &VariableId) -> Option<&mut CellValue> {
        self.entries
            .iter_mut()
            .find(|(id, _)| id == variable)
            .map(|(_, value)| value)
    }

    /// Entries in variable-list order.
    pub fn iter(&self) -> impl Iterator<Item = (&VariableId, &CellValue)> {
        self.entries.iter().map(|(id, value)| (id, value))
    }

    /// Key/value pairs ready for a store write.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, CellValue)> {
        self.entries
            .iter()
            .map(|(id, value)| (id.as_str(), value.clone()))
    }

    /// Variables the host refused to read.
    pub fn failed(&self) -> &[VariableId] {
        &self.failed
    }

    /// Number of captured entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read every listed variable from the host.
///
/// Variables the filter rejects are recorded as [`CellValue::NotSampled`]
/// without contacting the host. A failed read is logged and the variable
/// left out of the capture.
///
/// # Errors
///
/// Returns [`BridgeError::Closed`] or [`BridgeError::Poisoned`] if the
/// session itself is unusable. Per-variable host errors do not abort the
/// capture.
pub fn capture_snapshot<C: Connector>(
    session: &mut Session<'_, C>,
    list: &VariableList,
    filter: &Filter,
) -> Result<Capture, BridgeError> {
    let mut capture = Capture::default();

    for variable in list.iter() {
        if !filter.matches(variable) {
            capture
                .entries
                .push((variable.clone(), CellValue::NotSampled));
            continue;
        }

        match session.get(variable) {
            Ok(text) => capture
                .entries
                .push((variable.clone(), CellValue::from(text))),
            Err(err @ (BridgeError::Closed | BridgeError::Poisoned)) => return Err(err),
            Err(err) => {
                tracing::warn!(variable = %variable, error = %err, "Variable read failed, skipping");
                capture.failed.push(variable.clone());
            }
        }
    }

    tracing::info!(
        captured = capture.len(),
        failed = capture.failed.len(),
        "Snapshot captured"
    );
    Ok(capture)
}
