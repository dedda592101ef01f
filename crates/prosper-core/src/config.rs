//! Configuration loading and typed config structures for the model-history
//! workflows.
//!
//! The configuration lives in `prosper-mc.yaml` next to the binary. This
//! module defines strongly-typed structs that mirror the YAML structure,
//! and provides a loader that reads and validates the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use prosper_bridge::{BackoffPolicy, Filter};
use prosper_history::{HistoryError, StoreConfig};
use prosper_types::{EntityName, LabelGenerator, VariableId};
use serde::Deserialize;

/// Environment variable overriding `store.path`.
pub const ENV_DB_PATH: &str = "PROSPER_DB_PATH";

/// Environment variable overriding `workflow.models_dir`.
pub const ENV_MODELS_DIR: &str = "PROSPER_MODELS_DIR";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `prosper-mc.yaml`. Every section is optional
/// and falls back to the defaults of the original field workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryConfig {
    /// History store file settings.
    #[serde(default)]
    pub store: StorageConfig,

    /// Which variables to read from a model.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Entity, model paths and label naming.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Perturbation exercise parameters.
    #[serde(default)]
    pub exercise: ExerciseConfig,

    /// Polling schedule for long-running host commands.
    #[serde(default)]
    pub wait: WaitConfig,
}

impl HistoryConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `PROSPER_DB_PATH` overrides `store.path`
    /// - `PROSPER_MODELS_DIR` overrides `workflow.models_dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, applying environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails validation.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `PROSPER_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_DB_PATH) {
            self.store.path = PathBuf::from(val);
        }
        if let Some(val) = lookup(ENV_MODELS_DIR) {
            self.workflow.models_dir = PathBuf::from(val);
        }
    }

    /// Check values serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.store_config()?;
        self.workflow.entity()?;
        self.workflow.label_generator()?;
        self.exercise.targets()?;

        if self.exercise.min_percent > self.exercise.max_percent {
            return Err(ConfigError::Invalid {
                field: "exercise.min_percent",
                reason: format!(
                    "{} is greater than exercise.max_percent ({})",
                    self.exercise.min_percent, self.exercise.max_percent
                ),
            });
        }
        if self.wait.initial_step_ms == 0 || self.wait.max_step_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "wait",
                reason: "poll steps must be at least 1 ms".to_owned(),
            });
        }
        if self.workflow.model_extension.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "workflow.model_extension",
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// History store file settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Path of the `SQLite` file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Name of the key column in every entity table.
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Milliseconds to wait on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StorageConfig {
    /// Build the store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the key column name is invalid.
    pub fn store_config(&self) -> Result<StoreConfig, ConfigError> {
        StoreConfig::new(&self.path)
            .with_key_column(&self.key_column)
            .map(|config| config.with_busy_timeout(Duration::from_millis(self.busy_timeout_ms)))
            .map_err(|err: HistoryError| ConfigError::Invalid {
                field: "store.key_column",
                reason: err.to_string(),
            })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            key_column: default_key_column(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Which variables to read from a model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CaptureConfig {
    /// Text file listing one variable per line.
    #[serde(default = "default_variables_file")]
    pub variables_file: PathBuf,

    /// Substrings selecting which listed variables are actually read.
    #[serde(default = "default_filter")]
    pub filter: Vec<String>,
}

impl CaptureConfig {
    /// The configured variable filter.
    pub fn filter(&self) -> Filter {
        Filter::new(&self.filter)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            variables_file: default_variables_file(),
            filter: default_filter(),
        }
    }
}

/// Entity, model paths and label naming.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkflowConfig {
    /// Entity table the exercise writes to.
    #[serde(default = "default_entity")]
    pub entity: String,

    /// Model opened by the exercise.
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Directory scanned when initialising history.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Model file extension, compared case-insensitively.
    #[serde(default = "default_model_extension")]
    pub model_extension: String,

    /// Prefix of generated snapshot labels.
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
}

impl WorkflowConfig {
    /// The validated entity name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the name is not a valid table
    /// name.
    pub fn entity(&self) -> Result<EntityName, ConfigError> {
        EntityName::parse(&self.entity).map_err(|err| ConfigError::Invalid {
            field: "workflow.entity",
            reason: err.to_string(),
        })
    }

    /// A label generator using the configured prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the prefix cannot start a valid
    /// label.
    pub fn label_generator(&self) -> Result<LabelGenerator, ConfigError> {
        LabelGenerator::new(&self.label_prefix).map_err(|err| ConfigError::Invalid {
            field: "workflow.label_prefix",
            reason: err.to_string(),
        })
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            entity: default_entity(),
            model_path: default_model_path(),
            models_dir: default_models_dir(),
            model_extension: default_model_extension(),
            label_prefix: default_label_prefix(),
        }
    }
}

/// Perturbation exercise parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExerciseConfig {
    /// Number of perturbed snapshots written after the first capture.
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Variables whose values are perturbed and reported.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    /// Lowest scale factor, in percent.
    #[serde(default = "default_min_percent")]
    pub min_percent: u32,

    /// Highest scale factor, in percent.
    #[serde(default = "default_max_percent")]
    pub max_percent: u32,

    /// Random seed for reproducible runs. Unset means a fresh seed.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ExerciseConfig {
    /// The validated target identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad target.
    pub fn targets(&self) -> Result<Vec<VariableId>, ConfigError> {
        self.targets
            .iter()
            .map(|target| {
                VariableId::parse(target).map_err(|err| ConfigError::Invalid {
                    field: "exercise.targets",
                    reason: err.to_string(),
                })
            })
            .collect()
    }
}

impl Default for ExerciseConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            targets: default_targets(),
            min_percent: default_min_percent(),
            max_percent: default_max_percent(),
            seed: None,
        }
    }
}

/// Polling schedule for long-running host commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WaitConfig {
    /// First sleep between polls.
    #[serde(default = "default_initial_step_ms")]
    pub initial_step_ms: u64,

    /// Ceiling for a single sleep.
    #[serde(default = "default_max_step_ms")]
    pub max_step_ms: u64,

    /// Overall wait cap.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl WaitConfig {
    /// The polling policy described by this section.
    pub const fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_step: Duration::from_millis(self.initial_step_ms),
            max_step: Duration::from_millis(self.max_step_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_step_ms: default_initial_step_ms(),
            max_step_ms: default_max_step_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_store_path() -> PathBuf {
    PathBuf::from("model_history.sqlite")
}

fn default_key_column() -> String {
    prosper_history::DEFAULT_KEY_COLUMN.to_owned()
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_variables_file() -> PathBuf {
    PathBuf::from("Prosper_OS_Variables_main.txt")
}

fn default_filter() -> Vec<String> {
    vec![".PVT".to_owned(), ".SIN".to_owned(), ".COR".to_owned()]
}

fn default_entity() -> String {
    "Well01".to_owned()
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/well_A.Out")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_extension() -> String {
    "OUT".to_owned()
}

fn default_label_prefix() -> String {
    "Update".to_owned()
}

const fn default_iterations() -> u32 {
    50
}

fn default_targets() -> Vec<String> {
    [
        "PROSPER.SIN.IPR.SINGLE.PRES",
        "PROSPER.SIN.IPR.SINGLE.PINDEX",
        "PROSPER.SIN.IPR.SINGLE.WC",
        "PROSPER.ANL.COR.CORR[{PETROLEUMEXPERTS2}].A[0]",
        "PROSPER.ANL.COR.CORR[{PETROLEUMEXPERTS2}].A[1]",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

const fn default_min_percent() -> u32 {
    95
}

const fn default_max_percent() -> u32 {
    105
}

const fn default_initial_step_ms() -> u64 {
    1
}

const fn default_max_step_ms() -> u64 {
    2000
}

const fn default_timeout_ms() -> u64 {
    600_000
}
