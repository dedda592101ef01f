//! Error types for the automation bridge.
//!
//! Uses `thiserror` for typed errors that surface through the bridge:
//! host-reported failures, lost sessions, waits that exceed their cap, and
//! malformed variable lists or model files.

use std::path::PathBuf;
use std::time::Duration;

use prosper_types::{AppName, TypeError};

/// Errors that can occur while talking to the host application.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The host reported an error for a value read or write.
    #[error("{app} error {code} on {target}: {message}")]
    Host {
        /// Application that reported the error.
        app: AppName,
        /// Host error code (always positive).
        code: i32,
        /// The variable that was addressed.
        target: String,
        /// Host-supplied error description.
        message: String,
    },

    /// The host rejected a command.
    #[error("command {command:?} failed with code {code}: {message}")]
    Command {
        /// The command text.
        command: String,
        /// Host error code.
        code: i32,
        /// Host-supplied error description.
        message: String,
    },

    /// Could not establish a connection to the host.
    #[error("cannot connect to automation server: {0}")]
    Connect(String),

    /// The session was used after it was closed.
    #[error("automation session is closed")]
    Closed,

    /// Shared host state was poisoned by a panicking thread.
    #[error("automation host state is poisoned")]
    Poisoned,

    /// The host stayed busy past the configured wait cap.
    #[error("{app} still busy after {waited:?}")]
    Timeout {
        /// Application that was polled.
        app: AppName,
        /// Time spent waiting.
        waited: Duration,
    },

    /// A line of a variable list is not a valid identifier.
    #[error("variable list line {line}: {source}")]
    VariableList {
        /// 1-based line number.
        line: usize,
        /// The validation error.
        source: TypeError,
    },

    /// A simulated model file could not be parsed.
    #[error("model file {} line {line}: {reason}", path.display())]
    ModelFile {
        /// The model file path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },

    /// A value or command failed boundary validation.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Reading a variable list or model file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_display() {
        let err = BridgeError::Host {
            app: AppName::Prosper,
            code: 3,
            target: "PROSPER.SIN.X".to_owned(),
            message: "no such variable".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("PROSPER error 3"));
        assert!(msg.contains("PROSPER.SIN.X"));
    }

    #[test]
    fn variable_list_error_names_the_line() {
        let err = BridgeError::VariableList {
            line: 7,
            source: TypeError::MalformedVariable {
                input: "X".to_owned(),
                reason: "missing application prefix",
            },
        };
        assert!(err.to_string().contains("line 7"));
    }
}
