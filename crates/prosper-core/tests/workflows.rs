//! End-to-end workflow tests against the simulated host.
//!
//! Every test builds a scratch directory holding a variable list, model
//! files and the history store, and removes it when done.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::panic
)]

use std::path::{Path, PathBuf};

use prosper_bridge::{BridgeError, Session, SimulatedHost};
use prosper_core::{HistoryConfig, WorkflowError, Workflows};
use prosper_history::HistoryError;
use prosper_types::{EntityName, SnapshotLabel, VariableId};
use uuid::Uuid;

// =============================================================================
// Helpers
// =============================================================================

const VARIABLES: &str = "\
PROSPER.SIN.IPR.SINGLE.PRES
PROSPER.SIN.IPR.SINGLE.WC
PROSPER.PVT.INPUT.GOR
PROSPER.ANL.SYS.RATE
";

const WELL_A: &str = "\
# Well A
PROSPER.SIN.IPR.SINGLE.PRES = 3000
PROSPER.SIN.IPR.SINGLE.WC = 10
PROSPER.PVT.INPUT.GOR = 400
PROSPER.ANL.SYS.RATE = 1200
";

/// A directory with a variable list, a models folder and a store path.
struct Scratch {
    root: PathBuf,
    config: HistoryConfig,
}

impl Scratch {
    fn new() -> Self {
        let root = std::env::temp_dir().join(format!("prosper-core-{}", Uuid::now_v7()));
        let models = root.join("models");
        std::fs::create_dir_all(&models).expect("create scratch dir");
        std::fs::write(root.join("variables.txt"), VARIABLES).expect("write variables");
        std::fs::write(models.join("well_A.Out"), WELL_A).expect("write model");

        let mut config = HistoryConfig::default();
        config.store.path = root.join("history.sqlite");
        config.capture.variables_file = root.join("variables.txt");
        config.workflow.models_dir = models.clone();
        config.workflow.model_path = models.join("well_A.Out");
        config.exercise.iterations = 3;
        config.exercise.targets = vec![
            "PROSPER.SIN.IPR.SINGLE.PRES".to_owned(),
            "PROSPER.SIN.IPR.SINGLE.WC".to_owned(),
        ];
        config.exercise.min_percent = 200;
        config.exercise.max_percent = 200;
        config.exercise.seed = Some(11);
        config.validate().expect("valid config");

        Self { root, config }
    }

    fn models(&self) -> PathBuf {
        self.root.join("models")
    }

    fn write_model(&self, name: &str, body: &str) -> PathBuf {
        let path = self.models().join(name);
        std::fs::write(&path, body).expect("write model");
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn var(name: &str) -> VariableId {
    VariableId::parse(name).expect("valid variable")
}

fn entity(name: &str) -> EntityName {
    EntityName::parse(name).expect("valid entity")
}

// =============================================================================
// Exercise
// =============================================================================

#[tokio::test]
async fn exercise_records_perturbed_history_and_restores() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();

    let report = workflows.exercise().await.unwrap();

    assert_eq!(report.entity.as_str(), "Well01");
    assert_eq!(report.labels.len(), 4);
    assert!(report.labels.windows(2).all(|w| w[0] < w[1]));
    assert!(report.labels[0].as_str().starts_with("Update_"));
    assert_eq!(report.restored_label, report.labels[0]);

    assert_eq!(
        report.series["PROSPER.SIN.IPR.SINGLE.PRES"],
        vec![3000.0, 6000.0, 12000.0, 24000.0]
    );
    assert_eq!(
        report.series["PROSPER.SIN.IPR.SINGLE.WC"],
        vec![10.0, 20.0, 40.0, 80.0]
    );

    // PRES, WC and GOR were sampled; RATE is outside the filter.
    assert_eq!(report.restored.applied, 3);
    assert_eq!(report.restored.skipped, 1);
    assert!(report.restored.failed.is_empty());
    assert_eq!(
        host.value(&var("PROSPER.SIN.IPR.SINGLE.PRES")).unwrap().as_deref(),
        Some("3000")
    );

    assert_eq!(host.loaded_model().unwrap(), Some(scratch.config.workflow.model_path.clone()));
    assert_eq!(host.open_sessions().unwrap(), 0);

    let stored = workflows.store().list_snapshots(&report.entity).await.unwrap();
    assert_eq!(stored, report.labels);
}

#[tokio::test]
async fn exercise_fails_cleanly_when_the_model_is_missing() {
    let mut scratch = Scratch::new();
    scratch.config.workflow.model_path = scratch.models().join("absent.Out");
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();

    let err = workflows.exercise().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Bridge { .. }));
    assert_eq!(host.open_sessions().unwrap(), 0);
    assert!(!scratch.config.store.path.exists());
}

#[tokio::test]
async fn exercise_reports_unreachable_host() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    host.refuse_connections(true).unwrap();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();

    let err = workflows.exercise().await.unwrap_err();
    assert!(matches!(err, WorkflowError::Bridge { .. }));
}

// =============================================================================
// History initialisation
// =============================================================================

#[tokio::test]
async fn initialize_history_captures_every_model() {
    let scratch = Scratch::new();
    scratch.write_model("well_b.OUT", "PROSPER.SIN.IPR.SINGLE.PRES = 2500\n");
    scratch.write_model("notes.txt", "not a model\n");
    scratch.write_model("broken.out", "THIS LINE IS NOT A VARIABLE\n");

    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let snapshots = workflows.initialize_history().await.unwrap();

    let entities: Vec<_> = snapshots.iter().map(|s| s.entity.as_str()).collect();
    assert_eq!(entities, vec!["WELL_A", "WELL_B"]);

    // WELL_B lacks two of the sampled variables.
    assert_eq!(
        snapshots[1].failed_reads,
        vec!["PROSPER.SIN.IPR.SINGLE.WC", "PROSPER.PVT.INPUT.GOR"]
    );
    assert!(snapshots[1].write.created_table);

    let mut listed = workflows.store().list_entities().await.unwrap();
    listed.sort();
    assert_eq!(listed, vec![entity("WELL_A"), entity("WELL_B")]);

    let cells = workflows
        .store()
        .read_snapshot(&entity("WELL_B"), &snapshots[1].label)
        .await
        .unwrap();
    assert_eq!(
        cells["PROSPER.SIN.IPR.SINGLE.PRES"].as_value(),
        Some("2500")
    );
    assert_eq!(host.open_sessions().unwrap(), 0);
}

#[tokio::test]
async fn initialize_history_with_no_models_writes_nothing() {
    let scratch = Scratch::new();
    std::fs::remove_file(scratch.models().join("well_A.Out")).unwrap();

    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let snapshots = workflows.initialize_history().await.unwrap();

    assert!(snapshots.is_empty());
    assert_eq!(host.total_connections().unwrap(), 0);
    assert!(!scratch.config.store.path.exists());
}

#[tokio::test]
async fn initialize_history_needs_a_models_directory() {
    let mut scratch = Scratch::new();
    scratch.config.workflow.models_dir = scratch.root.join("nowhere");

    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let err = workflows.initialize_history().await.unwrap_err();
    assert!(matches!(err, WorkflowError::ModelsDir { .. }));
}

// =============================================================================
// Snapshot and restore
// =============================================================================

#[tokio::test]
async fn snapshot_then_restore_rolls_back_host_changes() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let well = entity("WELL_A");

    let snapshot = workflows
        .snapshot(&well, Some(&scratch.config.workflow.model_path))
        .await
        .unwrap();
    assert_eq!(snapshot.write.written, 4);

    {
        let mut session = Session::open(&host).unwrap();
        session
            .set(&var("PROSPER.SIN.IPR.SINGLE.PRES"), "1")
            .unwrap();
    }

    let report = workflows.restore(&well, &snapshot.label, None).await.unwrap();
    assert_eq!(report.applied, 3);
    assert_eq!(
        host.value(&var("PROSPER.SIN.IPR.SINGLE.PRES")).unwrap().as_deref(),
        Some("3000")
    );
}

#[tokio::test]
async fn restore_into_a_model_file_saves_it() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let well = entity("WELL_A");
    let model = scratch.config.workflow.model_path.clone();

    let snapshot = workflows.snapshot(&well, Some(&model)).await.unwrap();
    scratch.write_model(
        "well_A.Out",
        "PROSPER.SIN.IPR.SINGLE.PRES = 1\nPROSPER.SIN.IPR.SINGLE.WC = 99\nPROSPER.PVT.INPUT.GOR = 1\n",
    );

    let report = workflows
        .restore(&well, &snapshot.label, Some(&model))
        .await
        .unwrap();
    assert_eq!(report.applied, 3);

    let saved = std::fs::read_to_string(&model).unwrap();
    assert!(saved.contains("PROSPER.SIN.IPR.SINGLE.PRES = 3000"), "{saved}");
    assert!(saved.contains("PROSPER.SIN.IPR.SINGLE.WC = 10"), "{saved}");
    assert!(host.commands().unwrap().last().unwrap().starts_with("PROSPER.SAVEFILE("));
}

#[tokio::test]
async fn restore_of_unknown_label_is_a_history_error() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let well = entity("WELL_A");
    workflows
        .snapshot(&well, Some(&scratch.config.workflow.model_path))
        .await
        .unwrap();

    let missing = SnapshotLabel::parse("Update_19990101_000000_000000").unwrap();
    let err = workflows.restore(&well, &missing, None).await.unwrap_err();
    match err {
        WorkflowError::History {
            source: HistoryError::ColumnNotFound { .. },
        } => {}
        other => panic!("unexpected error {other:?}"),
    }
}

// =============================================================================
// Host commands
// =============================================================================

#[tokio::test]
async fn run_command_waits_for_the_host_and_saves_the_model() {
    let mut scratch = Scratch::new();
    scratch.config.wait.initial_step_ms = 1;
    scratch.config.wait.max_step_ms = 2;
    scratch.config.wait.timeout_ms = 5_000;
    let host = SimulatedHost::new().with_busy_polls(3).unwrap();
    let workflows = Workflows::new(&scratch.config, &host).unwrap();
    let model = scratch.config.workflow.model_path.clone();

    let report = workflows
        .run_command(" PROSPER.ANL.SYS.CALC ", Some(&model), true)
        .await
        .unwrap();

    assert_eq!(report.command, "PROSPER.ANL.SYS.CALC");
    assert_eq!(report.app.as_str(), "PROSPER");
    assert_eq!(report.result, None);
    assert!(report.saved);
    assert_eq!(
        host.commands().unwrap(),
        vec![
            format!("PROSPER.OPENFILE({})", model.display()),
            "PROSPER.ANL.SYS.CALC".to_owned(),
            format!("PROSPER.SAVEFILE({})", model.display()),
        ]
    );
    assert_eq!(host.open_sessions().unwrap(), 0);
}

#[tokio::test]
async fn run_command_returns_network_results() {
    let scratch = Scratch::new();
    let model = scratch.write_model("network.Out", "GAP.LASTCMDRET = 42\n");
    let host = SimulatedHost::new().with_busy_polls(2).unwrap();
    let workflows = Workflows::new(&scratch.config, &host).unwrap();

    let report = workflows
        .run_command("GAP.SOLVENETWORK(0)", Some(&model), false)
        .await
        .unwrap();

    assert_eq!(report.result.as_deref(), Some("42"));
    assert!(!report.saved);
    assert!(
        !host
            .commands()
            .unwrap()
            .iter()
            .any(|c| c.starts_with("PROSPER.SAVEFILE("))
    );
}

#[tokio::test]
async fn run_command_gives_up_after_the_configured_timeout() {
    let mut scratch = Scratch::new();
    scratch.config.wait.initial_step_ms = 1;
    scratch.config.wait.max_step_ms = 5;
    scratch.config.wait.timeout_ms = 30;
    let host = SimulatedHost::new().with_busy_polls(u32::MAX).unwrap();
    let workflows = Workflows::new(&scratch.config, &host).unwrap();

    let err = workflows
        .run_command("MBAL.CALC", None, true)
        .await
        .unwrap_err();
    match err {
        WorkflowError::Bridge {
            source: BridgeError::Timeout { waited, .. },
        } => assert!(waited >= std::time::Duration::from_millis(30)),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(host.open_sessions().unwrap(), 0);
}

#[tokio::test]
async fn run_command_rejects_unknown_applications() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    let workflows = Workflows::new(&scratch.config, &host).unwrap();

    let err = workflows.run_command("EXCEL.CALC", None, false).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Bridge { .. }));
    assert_eq!(host.total_connections().unwrap(), 0);
}

// =============================================================================
// Reporting
// =============================================================================

#[tokio::test]
async fn series_report_keeps_index_alignment() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let report = workflows.exercise().await.unwrap();

    let series = workflows
        .series_report(
            &report.entity,
            &[
                "prosper.sin.ipr.single.pres".to_owned(),
                "PROSPER.ANL.SYS.RATE".to_owned(),
            ],
        )
        .await
        .unwrap();

    assert_eq!(series.labels, report.labels);
    assert_eq!(series.series.len(), 2);

    let pres: Vec<_> = series.series[0].points.iter().map(|p| p.value).collect();
    assert_eq!(pres, vec![Some(3000.0), Some(6000.0), Some(12000.0), Some(24000.0)]);

    let rate: Vec<_> = series.series[1].points.iter().map(|p| p.value).collect();
    assert_eq!(rate, vec![None; 4]);

    let json = series.to_json().unwrap();
    assert!(json.contains(report.labels[0].as_str()));
}

#[tokio::test]
async fn series_report_defaults_to_every_key() {
    let scratch = Scratch::new();
    let host = SimulatedHost::new();
    let mut workflows = Workflows::new(&scratch.config, &host).unwrap();
    let well = entity("WELL_A");
    workflows
        .snapshot(&well, Some(Path::new(&scratch.config.workflow.model_path)))
        .await
        .unwrap();

    let series = workflows.series_report(&well, &[]).await.unwrap();
    let keys: Vec<_> = series.series.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "PROSPER.SIN.IPR.SINGLE.PRES",
            "PROSPER.SIN.IPR.SINGLE.WC",
            "PROSPER.PVT.INPUT.GOR",
            "PROSPER.ANL.SYS.RATE",
        ]
    );
}
