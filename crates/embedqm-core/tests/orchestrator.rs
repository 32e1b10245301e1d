mod common;

use common::{FixedMultipoleAnalyzer, RecordingProjector, ScriptedInductor, ScriptedQmEngine, region};
use embedqm::backends::archive::{ARCHIVE_FILE, FileArchiveWriter};
use embedqm::engine::collaborators::{Collaborators, ExcitedStateCandidate};
use embedqm::engine::config::{
    CouplingMode, EngineConfig, EngineConfigBuilder, ExcitationKind, ExcitedStateConfig,
};
use embedqm::engine::context::JobContext;
use embedqm::engine::convergence::ConvergenceTracker;
use embedqm::engine::error::FailureKind;
use embedqm::engine::orchestrator::{JobStatus, Orchestrator};
use embedqm::engine::progress::{Progress, ProgressReporter};
use embedqm::engine::selector::SelectionDiagnostic;
use nalgebra::{DMatrix, Vector3};
use std::path::Path;
use std::sync::{Arc, Mutex};

fn config(dir: &Path, mode: CouplingMode) -> EngineConfigBuilder {
    EngineConfigBuilder::new()
        .work_dir(dir.to_path_buf())
        .mode(mode)
        .max_position_rms(0.01)
        .max_charge_rms(0.01)
        .max_qm_energy_change(0.001)
        .max_mm_energy_change(0.001)
}

fn job(config: &EngineConfig) -> JobContext {
    JobContext::new(42, "scenario", region(), config).unwrap()
}

fn polarizable(engine: ScriptedQmEngine) -> Collaborators {
    Collaborators::new(Box::new(engine)).with_inductor(Box::new(ScriptedInductor::geometric()))
}

fn failure_kind(status: &JobStatus) -> Option<FailureKind> {
    match status {
        JobStatus::Failed { kind, .. } => Some(*kind),
        _ => None,
    }
}

#[test]
fn static_job_converges_after_exactly_one_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static).build().unwrap();
    let mut job = job(&config);
    let engine = ScriptedQmEngine::geometric();
    let backgrounds = engine.prepared_backgrounds.clone();
    let charge = engine.charge_and_multiplicity.clone();
    let reporter = ProgressReporter::new();

    let mut orchestrator = Orchestrator::new(&config, Collaborators::new(Box::new(engine)), &reporter);
    let outcome = orchestrator.evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::Converged);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(orchestrator.history().len(), 1);
    assert!(orchestrator.current_result().is_some());
    assert_eq!(*backgrounds.lock().unwrap(), vec![2]);
    assert_eq!(*charge.lock().unwrap(), Some((0, 1)));
    assert!(dir.path().join("xjob_42_scenario").join("iter_0").is_dir());

    let record = outcome.final_record.unwrap();
    assert_eq!(record.classical().mm_total(), 0.0);
    assert!((job.energies().qm - 0.1).abs() < 1e-12);
    assert!((job.energies().qmmm - 0.1).abs() < 1e-12);
}

#[test]
fn existing_job_directory_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static).build().unwrap();
    let mut job = job(&config);
    std::fs::create_dir_all(job.iteration_dir(0)).unwrap();
    let reporter = ProgressReporter::new();

    let outcome = Orchestrator::new(
        &config,
        Collaborators::new(Box::new(ScriptedQmEngine::geometric())),
        &reporter,
    )
    .evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::Converged);
}

#[test]
fn failing_run_aborts_on_first_iteration_without_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable).build().unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();

    let mut orchestrator =
        Orchestrator::new(&config, polarizable(ScriptedQmEngine::failing_run()), &reporter);
    let outcome = orchestrator.evaluate(&mut job);

    assert_eq!(
        failure_kind(&outcome.status),
        Some(FailureKind::SolverRunFailure)
    );
    assert_eq!(outcome.iterations, 0);
    assert!(outcome.final_record.is_none());
    assert!(orchestrator.history().is_empty());
}

#[test]
fn failing_parse_is_reported_as_parse_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static).build().unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();

    let outcome = Orchestrator::new(
        &config,
        Collaborators::new(Box::new(ScriptedQmEngine::failing_parse())),
        &reporter,
    )
    .evaluate(&mut job);

    assert_eq!(failure_kind(&outcome.status), Some(FailureKind::ParseFailure));
    assert_eq!(outcome.iterations, 0);
}

#[test]
fn geometrically_shrinking_residuals_converge_on_iteration_index_seven() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable).build().unwrap();
    let mut job = job(&config);
    let finished = Mutex::new(Vec::new());
    let reporter = ProgressReporter::with_callback(Box::new(|event| {
        if let Progress::IterationFinish { iteration, .. } = event {
            finished.lock().unwrap().push(iteration);
        }
    }));

    let mut orchestrator =
        Orchestrator::new(&config, polarizable(ScriptedQmEngine::geometric()), &reporter);
    let outcome = orchestrator.evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::Converged);
    assert_eq!(outcome.iterations, 8);
    assert!(outcome.flags.is_converged());

    let history = orchestrator.history();
    assert_eq!(history.len(), 8);
    assert!((history[0].residuals().position_rms - 1.0).abs() < 1e-12);
    assert!((history[3].residuals().charge_rms - 0.125).abs() < 1e-12);

    let tracker = ConvergenceTracker::new(*job.criteria());
    assert!(!tracker.check(&history[..7]).is_converged());
    assert!(tracker.check(&history[..8]).is_converged());

    drop(orchestrator);
    drop(reporter);
    assert_eq!(finished.into_inner().unwrap(), (0..8).collect::<Vec<_>>());
}

#[test]
fn qm_core_receives_qm_derived_positions_and_charges() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable)
        .max_iterations(2)
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();

    Orchestrator::new(&config, polarizable(ScriptedQmEngine::geometric()), &reporter)
        .evaluate(&mut job);

    let carbon = job.region().qm_core_sites().next().unwrap();
    assert!((carbon.position.x - 1.5).abs() < 1e-12);
    assert!((carbon.charge - 1.5).abs() < 1e-12);
}

#[test]
fn multipole_analyzer_sets_qm_core_dipoles() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static).build().unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let collaborators = Collaborators::new(Box::new(ScriptedQmEngine::geometric()))
        .with_multipole_analyzer(Box::new(FixedMultipoleAnalyzer {
            sites: 2,
            charge: 1.0,
            dipole: Vector3::new(0.0, 0.0, 0.25),
        }));

    let outcome = Orchestrator::new(&config, collaborators, &reporter).evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::Converged);
    assert!(
        job.region()
            .qm_core_sites()
            .all(|site| site.dipole == Vector3::new(0.0, 0.0, 0.25))
    );
}

#[test]
fn multipole_charges_replace_qm_result_charges_and_drive_residuals() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static).build().unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let collaborators = Collaborators::new(Box::new(ScriptedQmEngine::geometric()))
        .with_multipole_analyzer(Box::new(FixedMultipoleAnalyzer {
            sites: 2,
            charge: 0.7,
            dipole: Vector3::zeros(),
        }));

    let outcome = Orchestrator::new(&config, collaborators, &reporter).evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::Converged);
    let charges: Vec<f64> = job.region().qm_core_sites().map(|s| s.charge).collect();
    assert_eq!(charges, vec![0.7, 0.7]);
    let residuals = *outcome.final_record.unwrap().residuals();
    assert!((residuals.charge_rms - 0.7).abs() < 1e-12);
    assert!((residuals.charge_sum - 1.4).abs() < 1e-12);
}

#[test]
fn fitted_charges_take_precedence_over_multipole_charges() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable)
        .max_iterations(1)
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let mut engine = ScriptedQmEngine::geometric();
    engine.density_dim = Some(2);
    let projector = RecordingProjector {
        charges: vec![0.25, -0.25],
        densities: Arc::new(Mutex::new(Vec::new())),
    };
    let collaborators = polarizable(engine)
        .with_charge_projector(Box::new(projector))
        .with_multipole_analyzer(Box::new(FixedMultipoleAnalyzer {
            sites: 2,
            charge: 0.7,
            dipole: Vector3::new(0.1, 0.0, 0.0),
        }));

    Orchestrator::new(&config, collaborators, &reporter).evaluate(&mut job);

    let sites: Vec<_> = job.region().qm_core_sites().collect();
    assert_eq!(sites[0].charge, 0.25);
    assert_eq!(sites[1].charge, -0.25);
    assert!(sites.iter().all(|s| s.dipole == Vector3::new(0.1, 0.0, 0.0)));
}

#[test]
fn multipole_analysis_with_wrong_site_count_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static).build().unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let collaborators = Collaborators::new(Box::new(ScriptedQmEngine::geometric()))
        .with_multipole_analyzer(Box::new(FixedMultipoleAnalyzer {
            sites: 1,
            charge: 0.0,
            dipole: Vector3::zeros(),
        }));

    let outcome = Orchestrator::new(&config, collaborators, &reporter).evaluate(&mut job);

    assert_eq!(
        failure_kind(&outcome.status),
        Some(FailureKind::ChargeProjection)
    );
    assert_eq!(outcome.iterations, 0);
}

#[test]
fn exhausted_iteration_budget_is_a_distinct_status() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable)
        .max_iterations(3)
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();

    let outcome =
        Orchestrator::new(&config, polarizable(ScriptedQmEngine::geometric()), &reporter)
            .evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::IterationLimitReached);
    assert_eq!(outcome.iterations, 3);
    assert!(!outcome.flags.is_converged());
}

#[test]
fn inductor_non_convergence_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable).build().unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let collaborators = Collaborators::new(Box::new(ScriptedQmEngine::geometric()))
        .with_inductor(Box::new(ScriptedInductor::never_converging()));

    let outcome = Orchestrator::new(&config, collaborators, &reporter).evaluate(&mut job);

    assert_eq!(
        failure_kind(&outcome.status),
        Some(FailureKind::ClassicalNonConvergence)
    );
    assert_eq!(outcome.iterations, 0);
}

#[test]
fn polarizable_job_without_inductor_fails_before_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable).build().unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();

    let outcome = Orchestrator::new(
        &config,
        Collaborators::new(Box::new(ScriptedQmEngine::geometric())),
        &reporter,
    )
    .evaluate(&mut job);

    assert_eq!(
        failure_kind(&outcome.status),
        Some(FailureKind::Configuration)
    );
    assert!(!dir.path().join("xjob_42_scenario").exists());
}

fn excited_candidates() -> Vec<ExcitedStateCandidate> {
    vec![
        ExcitedStateCandidate {
            index: 0,
            oscillator_strength: 0.01,
            charge_transfer: 0.1,
            energy: 0.2,
        },
        ExcitedStateCandidate {
            index: 1,
            oscillator_strength: 0.4,
            charge_transfer: 0.9,
            energy: 0.3,
        },
    ]
}

#[test]
fn selected_excited_state_energy_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static)
        .excited_state(ExcitedStateConfig {
            state: 1,
            kind: ExcitationKind::Singlet,
            oscillator_strength_threshold: Some(0.1),
            charge_transfer_threshold: None,
        })
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let mut engine = ScriptedQmEngine::geometric();
    engine.excited = excited_candidates();

    let outcome =
        Orchestrator::new(&config, Collaborators::new(Box::new(engine)), &reporter)
            .evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::Converged);
    assert_eq!(outcome.final_record.unwrap().qm().excited, 0.3);
    assert_eq!(job.energies().excited, 0.3);
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn empty_selection_falls_back_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static)
        .excited_state(ExcitedStateConfig {
            state: 1,
            kind: ExcitationKind::Singlet,
            oscillator_strength_threshold: Some(0.9),
            charge_transfer_threshold: None,
        })
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let mut engine = ScriptedQmEngine::geometric();
    engine.excited = excited_candidates();

    let outcome =
        Orchestrator::new(&config, Collaborators::new(Box::new(engine)), &reporter)
            .evaluate(&mut job);

    assert_eq!(outcome.final_record.unwrap().qm().excited, 0.2);
    assert_eq!(
        outcome.diagnostics,
        vec![(0, SelectionDiagnostic::FilterYieldedEmpty)]
    );
}

#[test]
fn requesting_a_state_beyond_the_selection_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static)
        .excited_state(ExcitedStateConfig {
            state: 3,
            kind: ExcitationKind::Singlet,
            oscillator_strength_threshold: None,
            charge_transfer_threshold: None,
        })
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let mut engine = ScriptedQmEngine::geometric();
    engine.excited = excited_candidates();

    let outcome =
        Orchestrator::new(&config, Collaborators::new(Box::new(engine)), &reporter)
            .evaluate(&mut job);

    assert_eq!(
        failure_kind(&outcome.status),
        Some(FailureKind::ExcitedStateUnavailable)
    );
}

#[test]
fn projector_fits_charges_to_the_excited_state_density() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable)
        .max_iterations(1)
        .excited_state(ExcitedStateConfig {
            state: 1,
            kind: ExcitationKind::Singlet,
            oscillator_strength_threshold: None,
            charge_transfer_threshold: None,
        })
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let mut engine = ScriptedQmEngine::geometric();
    engine.excited = excited_candidates();
    engine.density_dim = Some(3);
    let densities = Arc::new(Mutex::new(Vec::new()));
    let projector = RecordingProjector {
        charges: vec![0.25, -0.25],
        densities: densities.clone(),
    };

    let outcome = Orchestrator::new(
        &config,
        polarizable(engine).with_charge_projector(Box::new(projector)),
        &reporter,
    )
    .evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::IterationLimitReached);
    let seen = densities.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let expected = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![0.0, 1.0, 2.0]));
    assert_eq!(seen[0], expected);

    let charges: Vec<f64> = job.region().qm_core_sites().map(|s| s.charge).collect();
    assert_eq!(charges, vec![0.25, -0.25]);
}

#[test]
fn archiving_writes_one_snapshot_per_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Polarizable)
        .max_iterations(2)
        .archive_iterations(true)
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();

    let outcome = Orchestrator::new(
        &config,
        polarizable(ScriptedQmEngine::geometric()).with_archive(Box::new(FileArchiveWriter::new())),
        &reporter,
    )
    .evaluate(&mut job);

    assert_eq!(outcome.iterations, 2);
    for i in 0..2 {
        assert!(job.iteration_dir(i).join(ARCHIVE_FILE).is_file());
    }
}

#[test]
fn archiving_never_overwrites_an_existing_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static)
        .archive_iterations(true)
        .build()
        .unwrap();
    let mut job = job(&config);
    std::fs::create_dir_all(job.iteration_dir(0)).unwrap();
    std::fs::write(job.iteration_dir(0).join(ARCHIVE_FILE), "previous").unwrap();
    let reporter = ProgressReporter::new();

    let outcome = Orchestrator::new(
        &config,
        Collaborators::new(Box::new(ScriptedQmEngine::geometric()))
            .with_archive(Box::new(FileArchiveWriter::new())),
        &reporter,
    )
    .evaluate(&mut job);

    assert_eq!(failure_kind(&outcome.status), Some(FailureKind::Archive));
    let content = std::fs::read_to_string(job.iteration_dir(0).join(ARCHIVE_FILE)).unwrap();
    assert_eq!(content, "previous");
}

#[test]
fn archived_snapshot_keeps_all_computed_excited_states() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), CouplingMode::Static)
        .archive_iterations(true)
        .excited_state(ExcitedStateConfig {
            state: 1,
            kind: ExcitationKind::Triplet,
            oscillator_strength_threshold: Some(0.1),
            charge_transfer_threshold: None,
        })
        .build()
        .unwrap();
    let mut job = job(&config);
    let reporter = ProgressReporter::new();
    let mut engine = ScriptedQmEngine::geometric();
    engine.excited = excited_candidates();

    let outcome = Orchestrator::new(
        &config,
        Collaborators::new(Box::new(engine)).with_archive(Box::new(FileArchiveWriter::new())),
        &reporter,
    )
    .evaluate(&mut job);

    assert_eq!(outcome.status, JobStatus::Converged);
    let content = std::fs::read_to_string(job.iteration_dir(0).join(ARCHIVE_FILE)).unwrap();
    assert_eq!(content.matches("[[result.excited]]").count(), 2);
    assert_eq!(content.matches("kind = \"triplet\"").count(), 2);
}
