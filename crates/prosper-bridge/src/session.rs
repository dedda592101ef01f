//! Scoped sessions with the host application's automation server.
//!
//! A [`Connector`] knows how to reach a host; a [`Session`] owns one live
//! connection and releases it when dropped, so early returns and `?` can
//! never leak a connection.
//!
//! ```text
//! Session::open(&connector) --> get / set / command ... --> drop => disconnect
//! ```

use std::path::Path;

use prosper_types::{AppName, VariableId};

use crate::error::BridgeError;
use crate::wait::{BackoffPolicy, wait_for_completion};

/// Variable holding the result of the last network-level function.
const GAP_LAST_RETURN: &str = "GAP.LASTCMDRET";

/// Synchronous request/response calls exposed by the host.
///
/// Implementations check the host's last-error state after every call and
/// report a non-zero code as an `Err`.
pub trait AutomationServer {
    /// Run a command and wait for it to return.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the host rejects the command.
    fn do_command(&mut self, command: &str) -> Result<(), BridgeError>;

    /// Start a command without waiting for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the host rejects the command.
    fn do_command_async(&mut self, command: &str) -> Result<(), BridgeError>;

    /// Whether `app` is still executing an asynchronous command.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be queried.
    fn is_busy(&mut self, app: AppName) -> Result<bool, BridgeError>;

    /// Read a variable's value as text.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Host`] if the host reports an error.
    fn get_value(&mut self, variable: &VariableId) -> Result<String, BridgeError>;

    /// Write a variable's value as text.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Host`] if the host reports an error.
    fn set_value(&mut self, variable: &VariableId, value: &str) -> Result<(), BridgeError>;

    /// Check the last-error state `app` left behind.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the last command reported an
    /// error.
    fn last_error(&mut self, app: AppName) -> Result<(), BridgeError>;
}

/// Opens and closes connections to an automation server.
pub trait Connector {
    /// The live connection type.
    type Server: AutomationServer;

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Connect`] if the host is unreachable.
    fn connect(&self) -> Result<Self::Server, BridgeError>;

    /// Release a connection. Must not fail.
    fn disconnect(&self, server: Self::Server);
}

/// One live connection, released on drop.
pub struct Session<'c, C: Connector> {
    connector: &'c C,
    server: Option<C::Server>,
}

impl<'c, C: Connector> Session<'c, C> {
    /// Connect through `connector`.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if the connection cannot be made.
    pub fn open(connector: &'c C) -> Result<Self, BridgeError> {
        let server = connector.connect()?;
        tracing::debug!("Automation session opened");
        Ok(Self {
            connector,
            server: Some(server),
        })
    }

    /// Release the connection now instead of at end of scope.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(server) = self.server.take() {
            self.connector.disconnect(server);
            tracing::debug!("Automation session closed");
        }
    }

    fn server(&mut self) -> Result<&mut C::Server, BridgeError> {
        self.server.as_mut().ok_or(BridgeError::Closed)
    }

    /// Run a command.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the host rejects it.
    pub fn command(&mut self, command: &str) -> Result<(), BridgeError> {
        tracing::debug!(command, "Running host command");
        self.server()?.do_command(command)
    }

    /// Load a model file into the nodal-analysis application.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the host cannot open the file.
    pub fn open_model(&mut self, path: &Path) -> Result<(), BridgeError> {
        tracing::info!(path = %path.display(), "Opening model");
        self.command(&format!("{}.OPENFILE({})", AppName::Prosper, path.display()))
    }

    /// Save the model currently loaded in the nodal-analysis application.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the host cannot write the file.
    pub fn save_model(&mut self, path: &Path) -> Result<(), BridgeError> {
        tracing::info!(path = %path.display(), "Saving model");
        self.command(&format!("{}.SAVEFILE({})", AppName::Prosper, path.display()))
    }

    /// Start a long-running command and wait for the host to finish it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Type`] if the command has no valid application
    /// prefix, [`BridgeError::Command`] if the host rejects it, and
    /// [`BridgeError::Timeout`] if the host stays busy past
    /// `policy.timeout`.
    pub async fn run_slow_command(
        &mut self,
        command: &str,
        policy: &BackoffPolicy,
    ) -> Result<(), BridgeError> {
        let app = command_app(command)?;
        let server = self.server()?;
        server.do_command_async(command)?;
        wait_for_completion(app, policy, || server.is_busy(app)).await?;
        server.last_error(app)
    }

    /// Run a network-level function and return what it left in
    /// `GAP.LASTCMDRET`.
    ///
    /// # Errors
    ///
    /// Same as [`Session::run_slow_command`], plus [`BridgeError::Host`] if
    /// the return value cannot be read.
    pub async fn gap_function(
        &mut self,
        command: &str,
        policy: &BackoffPolicy,
    ) -> Result<String, BridgeError> {
        self.run_slow_command(command, policy).await?;
        self.get(&VariableId::parse(GAP_LAST_RETURN)?)
    }

    /// Read a variable.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Host`] if the host reports an error.
    pub fn get(&mut self, variable: &VariableId) -> Result<String, BridgeError> {
        self.server()?.get_value(variable)
    }

    /// Write a variable.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Host`] if the host reports an error.
    pub fn set(&mut self, variable: &VariableId, value: &str) -> Result<(), BridgeError> {
        self.server()?.set_value(variable, value)
    }
}

impl<C: Connector> Drop for Session<'_, C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// The application a command is addressed to (`GAP.SOLVENETWORK(...)`).
///
/// # Errors
///
/// Returns [`prosper_types::TypeError::MalformedVariable`] if there is no
/// prefix and [`prosper_types::TypeError::UnknownApplication`] if the
/// prefix is not recognised.
pub fn command_app(command: &str) -> Result<AppName, BridgeError> {
    let command = command.trim();
    let prefix = command
        .split_once('.')
        .map(|(prefix, _)| prefix)
        .filter(|prefix| !prefix.is_empty())
        .ok_or_else(|| prosper_types::TypeError::MalformedVariable {
            input: command.to_owned(),
            reason: "command has no application prefix",
        })?;
    Ok(prefix.parse::<AppName>()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn command_app_from_prefix() {
        assert_eq!(
            command_app("PROSPER.OPENFILE(C:\\models\\a.Out)").unwrap(),
            AppName::Prosper
        );
        assert_eq!(command_app("gap.solvenetwork(0)").unwrap(), AppName::Gap);
    }

    #[test]
    fn command_app_rejects_bad_prefixes() {
        assert!(command_app("OPENFILE").is_err());
        assert!(command_app(".OPENFILE").is_err());
        assert!(command_app("EXCEL.RUN()").is_err());
    }
}
