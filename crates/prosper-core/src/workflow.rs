//! End-to-end model-history workflows.
//!
//! Each workflow opens one automation session for its whole run and lets
//! the history store open and close its own connection per operation:
//!
//! ```text
//! exercise:           open model -> capture -> write S0
//!                     -> (perturb -> write Sn) x iterations
//!                     -> read series of targets -> restore S0
//! initialize_history: for each model file: open -> capture -> write
//! restore:            read snapshot -> open model -> apply -> save model
//! run_command:        open model -> slow command (wait policy) -> save model
//! series_report:      aligned series per key -> JSON
//! ```

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use prosper_bridge::{
    ApplyReport, Connector, Filter, Session, VariableList, apply_snapshot, capture_snapshot,
    command_app,
};
use prosper_history::{HistoryError, HistoryStore, WriteReport};
use prosper_types::{AppName, EntityName, LabelGenerator, SnapshotLabel, VariableId};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::HistoryConfig;
use crate::error::WorkflowError;
use crate::perturb::{Perturbation, rng_from_seed};

/// One snapshot written by a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSnapshot {
    /// Entity table written to.
    pub entity: EntityName,
    /// Snapshot column written.
    pub label: SnapshotLabel,
    /// Model file the values were read from, if one was opened.
    pub model: Option<PathBuf>,
    /// Variables the host refused to read.
    pub failed_reads: Vec<String>,
    /// What the store did.
    pub write: WriteReport,
}

/// Outcome of [`Workflows::exercise`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseReport {
    /// Entity table written to.
    pub entity: EntityName,
    /// Every label written, oldest first.
    pub labels: Vec<SnapshotLabel>,
    /// Numeric history of each target.
    pub series: BTreeMap<String, Vec<f64>>,
    /// The label the model was restored to.
    pub restored_label: SnapshotLabel,
    /// What restoring the first snapshot did.
    pub restored: ApplyReport,
}

/// Outcome of [`Workflows::run_command`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    /// The command as sent to the host.
    pub command: String,
    /// Application that ran it.
    pub app: AppName,
    /// Model file opened before the command, if any.
    pub model: Option<PathBuf>,
    /// What a network command left in `GAP.LASTCMDRET`.
    pub result: Option<String>,
    /// The model was saved after the command.
    pub saved: bool,
}

/// One snapshot's value in a [`SeriesReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPoint {
    /// Snapshot label.
    pub label: String,
    /// Numeric value, or `None` if not sampled, missing or not numeric.
    pub value: Option<f64>,
}

/// History of one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeySeries {
    /// Variable key.
    pub key: String,
    /// One point per snapshot, oldest first.
    pub points: Vec<ReportPoint>,
}

/// Index-aligned histories for charting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesReport {
    /// Entity the series belong to.
    pub entity: EntityName,
    /// Every snapshot label, oldest first.
    pub labels: Vec<SnapshotLabel>,
    /// One entry per requested key.
    pub series: Vec<KeySeries>,
}

impl SeriesReport {
    /// Render as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Serialize`] if serialization fails.
    pub fn to_json(&self) -> Result<String, WorkflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Workflows bound to one configuration, host and store.
pub struct Workflows<'a, C: Connector> {
    config: &'a HistoryConfig,
    connector: &'a C,
    store: HistoryStore,
    labels: LabelGenerator,
}

impl<'a, C: Connector> Workflows<'a, C> {
    /// Bind workflows to `config` and `connector`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Config`] if the store or label settings are
    /// invalid.
    pub fn new(config: &'a HistoryConfig, connector: &'a C) -> Result<Self, WorkflowError> {
        Ok(Self {
            config,
            connector,
            store: HistoryStore::new(config.store.store_config()?),
            labels: config.workflow.label_generator()?,
        })
    }

    /// The history store these workflows write to.
    pub const fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Run the perturbation exercise on the configured model.
    ///
    /// Captures the model, writes it, then writes `iterations` perturbed
    /// copies under fresh labels, reads back every target's series, and
    /// finally restores the model to the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first store, host or configuration error.
    pub async fn exercise(&mut self) -> Result<ExerciseReport, WorkflowError> {
        let entity = self.config.workflow.entity()?;
        let targets = self.config.exercise.targets()?;
        let list = VariableList::from_file(&self.config.capture.variables_file).await?;
        let filter = self.config.capture.filter();
        let perturbation = Perturbation::from_config(&self.config.exercise);
        let mut rng = rng_from_seed(self.config.exercise.seed);

        info!(
            %entity,
            model = %self.config.workflow.model_path.display(),
            iterations = self.config.exercise.iterations,
            variables = list.len(),
            "Exercise starting"
        );

        let connector = self.connector;
        let mut session = Session::open(connector)?;
        session.open_model(&self.config.workflow.model_path)?;

        // 1. Capture and record the starting state
        let mut capture = capture_snapshot(&mut session, &list, &filter)?;
        let first_label = self.labels.next_label()?;
        self.store
            .write_snapshot(&entity, &first_label, capture.pairs())
            .await?;
        let mut labels = vec![first_label.clone()];

        // 2. Fabricate model updates
        for iteration in 1..=self.config.exercise.iterations {
            perturbation.apply(&mut capture, &targets, &mut rng);
            let label = self.labels.next_label()?;
            let report = self
                .store
                .write_snapshot(&entity, &label, capture.pairs())
                .await?;
            tracing::debug!(iteration, %label, written = report.written, "Perturbed snapshot written");
            labels.push(label);
        }

        // 3. Read back target histories
        let mut series = BTreeMap::new();
        for target in &targets {
            let values = self.target_series(&entity, target).await?;
            series.insert(target.as_str().to_owned(), values);
        }

        // 4. Return the model to its starting state
        let cells = self.store.read_snapshot(&entity, &first_label).await?;
        let restored = apply_snapshot(&mut session, cells)?;
        session.close();

        info!(%entity, snapshots = labels.len(), restored = restored.applied, "Exercise complete");
        Ok(ExerciseReport {
            entity,
            labels,
            series,
            restored_label: first_label,
            restored,
        })
    }

    /// Record the current state of every model in the models directory.
    ///
    /// Model files are matched on extension (case-insensitive) and visited
    /// in name order. Each one is written to the entity named after its
    /// upper-cased file stem. Models that cannot be opened or whose stem is
    /// not a valid entity name are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::ModelsDir`] if the directory cannot be
    /// read, and store or host errors that affect every model.
    pub async fn initialize_history(&mut self) -> Result<Vec<ModelSnapshot>, WorkflowError> {
        let models = self.model_files().await?;
        if models.is_empty() {
            warn!(
                dir = %self.config.workflow.models_dir.display(),
                extension = self.config.workflow.model_extension.as_str(),
                "No model files found"
            );
            return Ok(Vec::new());
        }

        let list = VariableList::from_file(&self.config.capture.variables_file).await?;
        let filter = self.config.capture.filter();
        let connector = self.connector;
        let mut session = Session::open(connector)?;
        let mut snapshots = Vec::with_capacity(models.len());

        for path in models {
            let Some(entity) = entity_for_model(&path) else {
                warn!(path = %path.display(), "Model file name is not a valid entity name, skipping");
                continue;
            };
            if let Err(err) = session.open_model(&path) {
                warn!(path = %path.display(), error = %err, "Cannot open model, skipping");
                continue;
            }
            let snapshot = self
                .capture_into(&mut session, &entity, &list, &filter, Some(path))
                .await?;
            snapshots.push(snapshot);
        }

        session.close();
        info!(models = snapshots.len(), "History initialised");
        Ok(snapshots)
    }

    /// Capture one model into `entity` under a fresh label.
    ///
    /// Opens `model` first if given; otherwise reads whatever model the
    /// host currently has loaded.
    ///
    /// # Errors
    ///
    /// Returns the first store, host or configuration error.
    pub async fn snapshot(
        &mut self,
        entity: &EntityName,
        model: Option<&Path>,
    ) -> Result<ModelSnapshot, WorkflowError> {
        let list = VariableList::from_file(&self.config.capture.variables_file).await?;
        let filter = self.config.capture.filter();
        let connector = self.connector;
        let mut session = Session::open(connector)?;
        if let Some(path) = model {
            session.open_model(path)?;
        }
        let snapshot = self
            .capture_into(&mut session, entity, &list, &filter, model.map(Path::to_path_buf))
            .await?;
        session.close();
        Ok(snapshot)
    }

    /// Write a stored snapshot back into the host.
    ///
    /// If `model` is given it is opened first and saved again afterwards,
    /// so the restored state persists in the model file.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::History`] if the snapshot does not exist
    /// and [`WorkflowError::Bridge`] if the host cannot be reached.
    pub async fn restore(
        &self,
        entity: &EntityName,
        label: &SnapshotLabel,
        model: Option<&Path>,
    ) -> Result<ApplyReport, WorkflowError> {
        let cells = self.store.read_snapshot(entity, label).await?;
        let mut session = Session::open(self.connector)?;
        if let Some(path) = model {
            session.open_model(path)?;
        }
        let report = apply_snapshot(&mut session, cells)?;
        if let Some(path) = model {
            session.save_model(path)?;
        }
        info!(%entity, %label, applied = report.applied, failed = report.failed.len(), "Snapshot restored");
        Ok(report)
    }

    /// Run a long-running host command and wait for it with the configured
    /// `wait` policy.
    ///
    /// Opens `model` first if given, and saves it again afterwards when
    /// `save` is set. Network commands (`GAP.` prefix) report what they
    /// left in `GAP.LASTCMDRET`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Bridge`] if the command has no known
    /// application prefix, the host rejects it, or the host stays busy past
    /// `wait.timeout_ms`.
    pub async fn run_command(
        &self,
        command: &str,
        model: Option<&Path>,
        save: bool,
    ) -> Result<CommandReport, WorkflowError> {
        let command = command.trim();
        let app = command_app(command)?;
        let policy = self.config.wait.policy();

        let mut session = Session::open(self.connector)?;
        if let Some(path) = model {
            session.open_model(path)?;
        }
        let result = if app == AppName::Gap {
            Some(session.gap_function(command, &policy).await?)
        } else {
            session.run_slow_command(command, &policy).await?;
            None
        };
        let saved = match model {
            Some(path) if save => {
                session.save_model(path)?;
                true
            }
            _ => false,
        };
        session.close();

        info!(command, %app, saved, "Host command finished");
        Ok(CommandReport {
            command: command.to_owned(),
            app,
            model: model.map(Path::to_path_buf),
            result,
            saved,
        })
    }

    /// Build index-aligned series for `keys`, or for every key if empty.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::History`] if the entity or a key does not
    /// exist.
    pub async fn series_report(
        &self,
        entity: &EntityName,
        keys: &[String],
    ) -> Result<SeriesReport, WorkflowError> {
        let labels = self.store.list_snapshots(entity).await?;
        let keys = if keys.is_empty() {
            self.store.list_keys(entity).await?
        } else {
            keys.to_vec()
        };

        let mut series = Vec::with_capacity(keys.len());
        for key in keys {
            let points = self
                .store
                .read_series_aligned(entity, &key)
                .await?
                .into_iter()
                .map(|point| ReportPoint {
                    value: point.cell.to_number().ok().flatten(),
                    label: point.label,
                })
                .collect();
            series.push(KeySeries { key, points });
        }

        Ok(SeriesReport {
            entity: entity.clone(),
            labels,
            series,
        })
    }

    async fn capture_into(
        &mut self,
        session: &mut Session<'_, C>,
        entity: &EntityName,
        list: &VariableList,
        filter: &Filter,
        model: Option<PathBuf>,
    ) -> Result<ModelSnapshot, WorkflowError> {
        let capture = capture_snapshot(session, list, filter)?;
        let label = self.labels.next_label()?;
        let write = self
            .store
            .write_snapshot(entity, &label, capture.pairs())
            .await?;
        info!(%entity, %label, written = write.written, "Snapshot recorded");

        Ok(ModelSnapshot {
            entity: entity.clone(),
            label,
            model,
            failed_reads: capture
                .failed()
                .iter()
                .map(|id| id.as_str().to_owned())
                .collect(),
            write,
        })
    }

    async fn target_series(
        &self,
        entity: &EntityName,
        target: &VariableId,
    ) -> Result<Vec<f64>, WorkflowError> {
        match self.store.read_series(entity, target.as_str()).await {
            Ok(values) => Ok(values),
            Err(HistoryError::KeyNotFound { .. }) => {
                warn!(%entity, variable = %target, "Target has no history");
                Ok(Vec::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn model_files(&self) -> Result<Vec<PathBuf>, WorkflowError> {
        let dir = &self.config.workflow.models_dir;
        let extension = self.config.workflow.model_extension.trim().trim_start_matches('.');
        let dir_error = |source| WorkflowError::ModelsDir {
            dir: dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(dir_error)?;
        let mut models = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if matches && entry.file_type().await.map_err(dir_error)?.is_file() {
                models.push(path);
            }
        }
        models.sort();
        Ok(models)
    }
}

/// Entity named after a model file: its upper-cased file stem.
fn entity_for_model(path: &Path) -> Option<EntityName> {
    let stem = path.file_stem()?.to_str()?;
    EntityName::parse(&stem.to_uppercase()).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_come_from_upper_cased_stems() {
        assert_eq!(
            entity_for_model(Path::new("models/well_A.Out")).unwrap().as_str(),
            "WELL_A"
        );
        assert!(entity_for_model(Path::new("models/well A.Out")).is_none());
        assert!(entity_for_model(Path::new("models/sqlite_master.out")).is_none());
    }
}
