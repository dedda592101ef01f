//! In-process stand-in for the desktop automation server.
//!
//! Holds a variable table in memory, loads it from `NAME = VALUE` model
//! files on `PROSPER.OPENFILE(...)` and writes it back on
//! `PROSPER.SAVEFILE(...)`. It can be told to stay busy or to
//! fail particular variables. Clones share state, so a test can keep one
//! handle for inspection while a workflow drives another.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use prosper_types::{AppName, VariableId};

use crate::error::BridgeError;
use crate::session::{AutomationServer, Connector, command_app};

/// Host error code for an unknown variable.
const ERR_UNKNOWN_VARIABLE: i32 = 1;

/// Host error code for an injected failure.
const ERR_ACCESS_DENIED: i32 = 2;

/// Host error code for an unrecognised command.
const ERR_BAD_COMMAND: i32 = 10;

const OPEN_FILE: &str = "PROSPER.OPENFILE(";
const SAVE_FILE: &str = "PROSPER.SAVEFILE(";

#[derive(Debug, Default)]
struct HostState {
    values: BTreeMap<VariableId, String>,
    failing: BTreeSet<VariableId>,
    busy_polls: u32,
    pending: BTreeMap<AppName, u32>,
    last_errors: BTreeMap<AppName, (i32, String)>,
    loaded_model: Option<PathBuf>,
    commands: Vec<String>,
    refuse_connections: bool,
    connects: u32,
    disconnects: u32,
}

/// A simulated automation host. Implements [`Connector`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedHost {
    /// An empty host with no variables.
    pub fn new() -> Self {
        Self::default()
    }

    /// A host pre-loaded with `values`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Type`] if a name is not a valid identifier.
    pub fn with_values<I, K, V>(values: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let host = Self::new();
        {
            let mut state = host.lock()?;
            for (name, value) in values {
                state
                    .values
                    .insert(VariableId::parse(name.as_ref())?, value.into());
            }
        }
        Ok(host)
    }

    /// Report busy for `polls` polls after every asynchronous command.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn with_busy_polls(self, polls: u32) -> Result<Self, BridgeError> {
        self.lock()?.busy_polls = polls;
        Ok(self)
    }

    /// Make every read and write of `variable` fail with a host error.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn fail_access_to(&self, variable: &VariableId) -> Result<(), BridgeError> {
        self.lock()?.failing.insert(variable.clone());
        Ok(())
    }

    /// Refuse (or accept again) new connections.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn refuse_connections(&self, refuse: bool) -> Result<(), BridgeError> {
        self.lock()?.refuse_connections = refuse;
        Ok(())
    }

    /// Current value of `variable`, if the host knows it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn value(&self, variable: &VariableId) -> Result<Option<String>, BridgeError> {
        Ok(self.lock()?.values.get(variable).cloned())
    }

    /// The model file most recently opened.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn loaded_model(&self) -> Result<Option<PathBuf>, BridgeError> {
        Ok(self.lock()?.loaded_model.clone())
    }

    /// Every command received so far, in order.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn commands(&self) -> Result<Vec<String>, BridgeError> {
        Ok(self.lock()?.commands.clone())
    }

    /// Connections currently open (connects minus disconnects).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn open_sessions(&self) -> Result<u32, BridgeError> {
        let state = self.lock()?;
        Ok(state.connects.saturating_sub(state.disconnects))
    }

    /// Total connections ever opened.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Poisoned`] if the shared state is poisoned.
    pub fn total_connections(&self) -> Result<u32, BridgeError> {
        Ok(self.lock()?.connects)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HostState>, BridgeError> {
        self.state.lock().map_err(|_poisoned| BridgeError::Poisoned)
    }
}

impl Connector for SimulatedHost {
    type Server = SimulatedServer;

    fn connect(&self) -> Result<SimulatedServer, BridgeError> {
        let mut state = self.lock()?;
        if state.refuse_connections {
            return Err(BridgeError::Connect(
                "simulated host refused the connection".to_owned(),
            ));
        }
        state.connects = state.connects.saturating_add(1);
        Ok(SimulatedServer {
            state: Arc::clone(&self.state),
        })
    }

    fn disconnect(&self, server: SimulatedServer) {
        match server.state.lock() {
            Ok(mut state) => state.disconnects = state.disconnects.saturating_add(1),
            Err(_poisoned) => tracing::warn!("Simulated host state poisoned on disconnect"),
        }
    }
}

/// One live connection to a [`SimulatedHost`].
#[derive(Debug)]
pub struct SimulatedServer {
    state: Arc<Mutex<HostState>>,
}

impl SimulatedServer {
    fn lock(&self) -> Result<MutexGuard<'_, HostState>, BridgeError> {
        self.state.lock().map_err(|_poisoned| BridgeError::Poisoned)
    }

    fn execute(&self, command: &str) -> Result<AppName, BridgeError> {
        let app = command_app(command).map_err(|err| BridgeError::Command {
            command: command.to_owned(),
            code: ERR_BAD_COMMAND,
            message: err.to_string(),
        })?;

        if let Some(path) = file_argument(command, OPEN_FILE) {
            let values = load_model(Path::new(path))?;
            let mut state = self.lock()?;
            state.values = values;
            state.loaded_model = Some(PathBuf::from(path));
        } else if let Some(path) = file_argument(command, SAVE_FILE) {
            let state = self.lock()?;
            save_model(Path::new(path), &state.values)?;
        }

        let mut state = self.lock()?;
        state.commands.push(command.trim().to_owned());
        state.last_errors.remove(&app);
        Ok(app)
    }

    fn check_access(
        state: &mut HostState,
        variable: &VariableId,
    ) -> Result<(), BridgeError> {
        let failure = if state.failing.contains(variable) {
            Some((ERR_ACCESS_DENIED, "access denied"))
        } else if !state.values.contains_key(variable) {
            Some((ERR_UNKNOWN_VARIABLE, "variable not found"))
        } else {
            None
        };

        match failure {
            Some((code, message)) => {
                state
                    .last_errors
                    .insert(variable.app(), (code, message.to_owned()));
                Err(BridgeError::Host {
                    app: variable.app(),
                    code,
                    target: variable.as_str().to_owned(),
                    message: message.to_owned(),
                })
            }
            None => {
                state.last_errors.remove(&variable.app());
                Ok(())
            }
        }
    }
}

impl AutomationServer for SimulatedServer {
    fn do_command(&mut self, command: &str) -> Result<(), BridgeError> {
        self.execute(command).map(|_app| ())
    }

    fn do_command_async(&mut self, command: &str) -> Result<(), BridgeError> {
        let app = self.execute(command)?;
        let mut state = self.lock()?;
        let polls = state.busy_polls;
        state.pending.insert(app, polls);
        Ok(())
    }

    fn is_busy(&mut self, app: AppName) -> Result<bool, BridgeError> {
        let mut state = self.lock()?;
        match state.pending.get_mut(&app) {
            Some(remaining) if *remaining > 0 => {
                *remaining = remaining.saturating_sub(1);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn get_value(&mut self, variable: &VariableId) -> Result<String, BridgeError> {
        let mut state = self.lock()?;
        Self::check_access(&mut state, variable)?;
        Ok(state.values.get(variable).cloned().unwrap_or_default())
    }

    fn set_value(&mut self, variable: &VariableId, value: &str) -> Result<(), BridgeError> {
        let mut state = self.lock()?;
        Self::check_access(&mut state, variable)?;
        state.values.insert(variable.clone(), value.to_owned());
        Ok(())
    }

    fn last_error(&mut self, app: AppName) -> Result<(), BridgeError> {
        let state = self.lock()?;
        match state.last_errors.get(&app) {
            Some((code, message)) => Err(BridgeError::Command {
                command: format!("{app} (last error)"),
                code: *code,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// The path inside `<verb><path>)`, if `command` is that verb.
fn file_argument<'c>(command: &'c str, verb: &str) -> Option<&'c str> {
    let command = command.trim();
    let head = command.get(..verb.len())?;
    if !head.eq_ignore_ascii_case(verb) {
        return None;
    }
    command.get(verb.len()..)?.strip_suffix(')').map(str::trim)
}

/// Write `values` as a `NAME = VALUE` model file.
fn save_model(path: &Path, values: &BTreeMap<VariableId, String>) -> Result<(), BridgeError> {
    let mut text = String::new();
    for (variable, value) in values {
        text.push_str(variable.as_str());
        text.push_str(" = ");
        text.push_str(value);
        text.push('\n');
    }
    std::fs::write(path, text)?;
    Ok(())
}

/// Read a `NAME = VALUE` model file. `#` starts a comment line.
fn load_model(path: &Path) -> Result<BTreeMap<VariableId, String>, BridgeError> {
    let text = std::fs::read_to_string(path)?;
    parse_model(path, &text)
}

fn parse_model(path: &Path, text: &str) -> Result<BTreeMap<VariableId, String>, BridgeError> {
    let mut values = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let line_no = index.saturating_add(1);
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad_line = |reason: String| BridgeError::ModelFile {
            path: path.to_path_buf(),
            line: line_no,
            reason,
        };
        let (name, value) = line
            .split_once('=')
            .ok_or_else(|| bad_line("expected NAME = VALUE".to_owned()))?;
        let variable = VariableId::parse(name).map_err(|err| bad_line(err.to_string()))?;
        values.insert(variable, value.trim().to_owned());
    }
    Ok(values)
}
