//! Cell values exchanged between the automation bridge and the history store.
//!
//! Everything is stored as text. A value written to the store is a
//! [`CellValue`]; a value read back is a [`StoredCell`], which adds the
//! [`StoredCell::Missing`] case for rows that did not exist when a column
//! was created.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Marker text stored for a variable that was deliberately not sampled.
pub const NOT_SAMPLED: &str = "Filtered out";

/// Marker shown for a null cell. Never stored.
pub const MISSING: &str = "<missing>";

/// A value captured for one variable in one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Raw text as returned by the host application.
    Text(String),
    /// A number produced locally (for example by perturbation).
    Number(f64),
    /// The variable was excluded from this snapshot.
    NotSampled,
}

impl CellValue {
    /// Interpret text coming from the host or from a caller.
    ///
    /// The [`NOT_SAMPLED`] marker maps to [`CellValue::NotSampled`];
    /// anything else is kept verbatim.
    pub fn from_text(text: &str) -> Self {
        if text == NOT_SAMPLED {
            Self::NotSampled
        } else {
            Self::Text(text.to_owned())
        }
    }

    /// Render the value in its stored text form.
    ///
    /// Numbers use Rust's shortest round-trip formatting with a forced
    /// decimal point (`10.0`, `0.25`, `1e21`).
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::NonFiniteNumber`] for NaN or infinite numbers
    /// and [`TypeError::UnrepresentableText`] for text containing NUL.
    pub fn to_text(&self) -> Result<String, TypeError> {
        match self {
            Self::Text(text) if text.contains('\0') => {
                Err(TypeError::UnrepresentableText(text.clone()))
            }
            Self::Text(text) => Ok(text.clone()),
            Self::Number(n) if !n.is_finite() => Err(TypeError::NonFiniteNumber(*n)),
            Self::Number(n) => Ok(format!("{n:?}")),
            Self::NotSampled => Ok(NOT_SAMPLED.to_owned()),
        }
    }

    /// The numeric reading of this value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Text(text) => parse_number(text),
            Self::Number(n) => n.is_finite().then_some(*n),
            Self::NotSampled => None,
        }
    }

    /// Whether this value is the "not sampled" marker.
    pub const fn is_not_sampled(&self) -> bool {
        matches!(self, Self::NotSampled)
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}

impl From<String> for CellValue {
    fn from(text: String) -> Self {
        if text == NOT_SAMPLED {
            Self::NotSampled
        } else {
            Self::Text(text)
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// A cell read back from the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredCell {
    /// The stored text.
    Value(String),
    /// The variable was deliberately not sampled in this snapshot.
    NotSampled,
    /// No value exists: the row was added after this snapshot was taken.
    Missing,
}

impl StoredCell {
    /// Classify a nullable text column value.
    pub fn from_column(column: Option<String>) -> Self {
        match column {
            None => Self::Missing,
            Some(text) if text == NOT_SAMPLED => Self::NotSampled,
            Some(text) => Self::Value(text),
        }
    }

    /// The stored text, if this cell carries a real value.
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Self::Value(text) => Some(text),
            Self::NotSampled | Self::Missing => None,
        }
    }

    /// Parse the cell as a number.
    ///
    /// Returns `Ok(None)` for [`StoredCell::NotSampled`] and
    /// [`StoredCell::Missing`].
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::NotNumeric`] if the stored text is not a finite
    /// number.
    pub fn to_number(&self) -> Result<Option<f64>, TypeError> {
        match self {
            Self::Value(text) => parse_number(text)
                .map(Some)
                .ok_or_else(|| TypeError::NotNumeric(text.clone())),
            Self::NotSampled | Self::Missing => Ok(None),
        }
    }

    /// Convert back into a value that can be re-applied or re-stored.
    ///
    /// [`StoredCell::Missing`] has no such form.
    pub fn to_cell_value(&self) -> Option<CellValue> {
        match self {
            Self::Value(text) => Some(CellValue::Text(text.clone())),
            Self::NotSampled => Some(CellValue::NotSampled),
            Self::Missing => None,
        }
    }
}

impl fmt::Display for StoredCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(text) => f.write_str(text),
            Self::NotSampled => f.write_str(NOT_SAMPLED),
            Self::Missing => f.write_str(MISSING),
        }
    }
}

/// Parse trimmed text as a finite `f64`.
fn parse_number(text: &str) -> Option<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_text_becomes_not_sampled() {
        assert_eq!(CellValue::from("Filtered out"), CellValue::NotSampled);
        assert_eq!(CellValue::from("10.0"), CellValue::Text("10.0".to_owned()));
    }

    #[test]
    fn numbers_keep_a_decimal_point() {
        assert_eq!(CellValue::Number(10.0).to_text().unwrap(), "10.0");
        assert_eq!(CellValue::Number(0.25).to_text().unwrap(), "0.25");
        assert_eq!(CellValue::Number(-3.5).to_text().unwrap(), "-3.5");
    }

    #[test]
    fn non_finite_numbers_do_not_serialize() {
        assert!(matches!(
            CellValue::Number(f64::NAN).to_text(),
            Err(TypeError::NonFiniteNumber(_))
        ));
        assert!(CellValue::Number(f64::INFINITY).to_text().is_err());
    }

    #[test]
    fn nul_text_does_not_serialize() {
        let err = CellValue::Text("a\0b".to_owned()).to_text().unwrap_err();
        assert!(matches!(err, TypeError::UnrepresentableText(_)));
    }

    #[test]
    fn not_sampled_serializes_to_marker() {
        assert_eq!(CellValue::NotSampled.to_text().unwrap(), NOT_SAMPLED);
    }

    #[test]
    fn stored_cells_classify_columns() {
        assert_eq!(StoredCell::from_column(None), StoredCell::Missing);
        assert_eq!(
            StoredCell::from_column(Some(NOT_SAMPLED.to_owned())),
            StoredCell::NotSampled
        );
        assert_eq!(
            StoredCell::from_column(Some("1.5".to_owned())),
            StoredCell::Value("1.5".to_owned())
        );
    }

    #[test]
    fn stored_cell_numbers() {
        assert_eq!(
            StoredCell::Value(" 12.5 ".to_owned()).to_number().unwrap(),
            Some(12.5)
        );
        assert_eq!(StoredCell::NotSampled.to_number().unwrap(), None);
        assert_eq!(StoredCell::Missing.to_number().unwrap(), None);
        assert!(StoredCell::Value("Oil".to_owned()).to_number().is_err());
        assert!(StoredCell::Value("NaN".to_owned()).to_number().is_err());
    }

    #[test]
    fn missing_and_not_sampled_display_differently() {
        assert_ne!(
            StoredCell::Missing.to_string(),
            StoredCell::NotSampled.to_string()
        );
    }
}
