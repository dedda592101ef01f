//! Error type for identifier parsing and cell value conversion.

/// Errors raised when a boundary value fails validation or conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    /// A dotted variable identifier is malformed (no application prefix,
    /// empty remainder, or forbidden characters).
    #[error("badly formed variable identifier {input:?}: {reason}")]
    MalformedVariable {
        /// The rejected input, as supplied.
        input: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The application prefix of a variable identifier is not recognised.
    #[error("unrecognised application name {app:?} in variable identifier {input:?}")]
    UnknownApplication {
        /// The rejected input, as supplied.
        input: String,
        /// The prefix that did not match any known application.
        app: String,
    },

    /// An entity name or snapshot label cannot be used as a table or
    /// column name.
    #[error("invalid {kind} {input:?}: {reason}")]
    InvalidName {
        /// Which kind of name was rejected (`entity`, `snapshot label`, ...).
        kind: &'static str,
        /// The rejected input.
        input: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A numeric cell value is NaN or infinite and has no stable text form.
    #[error("non-finite number {0} cannot be stored")]
    NonFiniteNumber(f64),

    /// A text cell value contains characters that cannot be stored.
    #[error("text value {0:?} contains a NUL character")]
    UnrepresentableText(String),

    /// A stored cell holds text that is neither numeric nor the
    /// "not sampled" marker.
    #[error("stored value {0:?} is not numeric")]
    NotNumeric(String),

    /// The label clock cannot advance any further.
    #[error("snapshot label clock exhausted after {0}")]
    LabelClockExhausted(String),
}
