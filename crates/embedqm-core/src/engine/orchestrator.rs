use super::collaborators::{
    Collaborators, ExcitedManifold, ExcitedStateCandidate, QmResult, SiteMultipoles, SnapshotId,
    TransitionDensity,
};
use super::config::{ConfigError, EngineConfig, ExcitedStateConfig};
use super::context::{JobContext, JobEnergies};
use super::convergence::{ConvergenceFlags, ConvergenceTracker};
use super::error::{EngineError, FailureKind};
use super::progress::{Progress, ProgressReporter};
use super::record::{ClassicalEnergies, IterationRecord, QmEnergies};
use super::selector::{ExcitedStateSelector, SelectionDiagnostic};
use crate::core::models::atom::QmAtom;
use crate::core::models::site::PolarSite;
use nalgebra::DMatrix;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, info_span, warn};

/// Terminal status of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Converged,
    IterationLimitReached,
    Failed { kind: FailureKind, reason: String },
}

impl JobStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Converged => write!(f, "converged"),
            JobStatus::IterationLimitReached => write!(f, "iteration-limit"),
            JobStatus::Failed { kind, .. } => write!(f, "failed ({kind})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: JobStatus,
    /// Number of completed outer iterations.
    pub iterations: usize,
    pub final_record: Option<IterationRecord>,
    /// Flags of the last convergence check; all unset if none was made.
    pub flags: ConvergenceFlags,
    /// Selector remarks, tagged with the iteration they were raised in.
    pub diagnostics: Vec<(usize, SelectionDiagnostic)>,
}

/// Drives the outer self-consistency loop of a single job.
pub struct Orchestrator<'a> {
    config: &'a EngineConfig,
    collaborators: Collaborators,
    reporter: &'a ProgressReporter<'a>,
    history: Vec<IterationRecord>,
    current: Option<QmResult>,
    diagnostics: Vec<(usize, SelectionDiagnostic)>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a EngineConfig,
        collaborators: Collaborators,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            config,
            collaborators,
            reporter,
            history: Vec::new(),
            current: None,
            diagnostics: Vec::new(),
        }
    }

    /// Records of the completed iterations of the last evaluated job.
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// QM result of the last completed iteration.
    pub fn current_result(&self) -> Option<&QmResult> {
        self.current.as_ref()
    }

    /// Runs the job to convergence, to the iteration limit, or to the first
    /// fatal collaborator failure.
    pub fn evaluate(&mut self, job: &mut JobContext) -> JobOutcome {
        let span = info_span!("job", id = job.id(), tag = %job.tag());
        let _guard = span.enter();

        self.history.clear();
        self.current = None;
        self.diagnostics.clear();

        let mut flags = ConvergenceFlags::default();
        let status = match self.run_loop(job, &mut flags) {
            Ok(status) => status,
            Err(e) => {
                error!(iteration = self.history.len(), "Job failed: {}", e);
                JobStatus::Failed {
                    kind: e.kind(),
                    reason: e.to_string(),
                }
            }
        };

        JobOutcome {
            status,
            iterations: self.history.len(),
            final_record: self.history.last().copied(),
            flags,
            diagnostics: self.diagnostics.clone(),
        }
    }

    fn run_loop(
        &mut self,
        job: &mut JobContext,
        flags: &mut ConvergenceFlags,
    ) -> Result<JobStatus, EngineError> {
        if job.region().is_empty() {
            return Err(EngineError::Internal("embedded region has no QM core".into()));
        }
        if job.mode().is_polarizable() && self.collaborators.inductor.is_none() {
            return Err(ConfigError::MissingParameter("inductor").into());
        }

        let criteria = *job.criteria();
        let (core, near, far) = job.region().shell_sizes();
        info!(
            "Starting job: {} QM segments, {} near-field, {} far-field, mode {:?}",
            core,
            near,
            far,
            job.mode()
        );
        info!(
            "Convergence criteria: dR={} dQ={} QM={} MM={} IT={}",
            criteria.max_position_rms,
            criteria.max_charge_rms,
            criteria.max_qm_energy_change,
            criteria.max_mm_energy_change,
            criteria.max_iterations
        );

        fs::create_dir_all(job.work_dir()).map_err(|e| EngineError::io(job.work_dir(), e))?;
        self.collaborators
            .qm_engine
            .set_charge_and_multiplicity(job.charge(), job.multiplicity());
        debug!(
            charge = job.charge(),
            multiplicity = job.multiplicity(),
            engine = self.collaborators.qm_engine.name(),
            "QM engine configured."
        );

        let tracker = ConvergenceTracker::new(criteria);
        let mut qm_atoms: Vec<QmAtom> = Vec::new();

        for iteration in 0..criteria.max_iterations {
            let record = self.iterate(job, iteration, &mut qm_atoms)?;
            self.reporter.report(Progress::IterationFinish {
                job_id: job.id(),
                iteration,
            });

            if !job.mode().is_polarizable() {
                info!("Static embedding: single iteration complete.");
                return Ok(JobStatus::Converged);
            }

            *flags = tracker.check(&self.history);
            info!(
                iteration = record.iteration(),
                "Convergence check: {} (dE_QM={:+.6e}, dE_MM={:+.6e})",
                flags,
                flags.qm_energy_delta.unwrap_or_default(),
                flags.mm_energy_delta.unwrap_or_default()
            );
            if flags.is_converged() {
                info!("Job converged after {} iterations.", self.history.len());
                return Ok(JobStatus::Converged);
            }
        }

        warn!(
            "Job not converged within {} iterations.",
            criteria.max_iterations
        );
        Ok(JobStatus::IterationLimitReached)
    }

    fn iterate(
        &mut self,
        job: &mut JobContext,
        iteration: usize,
        qm_atoms: &mut Vec<QmAtom>,
    ) -> Result<IterationRecord, EngineError> {
        let run_dir = job.iteration_dir(iteration);
        fs::create_dir_all(&run_dir).map_err(|e| EngineError::io(&run_dir, e))?;
        debug!(iteration, "Entering iteration.");

        let classical = self.induce(job, iteration)?;

        if iteration == 0 {
            *qm_atoms = job.region().qm_atoms()?;
        } else {
            for (atom, site) in qm_atoms.iter_mut().zip(job.region().qm_core_sites()) {
                atom.position = site.position;
            }
        }
        let background: Vec<PolarSite> = job.region().background_sites().cloned().collect();

        let engine = &mut self.collaborators.qm_engine;
        let solver_failure = |e: super::collaborators::CollaboratorError| {
            EngineError::SolverRunFailure {
                iteration,
                reason: e.to_string(),
            }
        };
        engine
            .prepare(&run_dir, qm_atoms, &background)
            .map_err(solver_failure)?;
        engine.run().map_err(solver_failure)?;

        let result = engine
            .parse_result()
            .map_err(|e| EngineError::ParseFailure {
                iteration,
                reason: e.to_string(),
            })?;
        if result.atoms.len() != qm_atoms.len() {
            return Err(EngineError::ParseFailure {
                iteration,
                reason: format!(
                    "expected {} QM atoms, result contains {}",
                    qm_atoms.len(),
                    result.atoms.len()
                ),
            });
        }

        let (excited, manifold) = match self.config.excited_state.filter(|es| es.state > 0) {
            Some(es) => {
                let (candidate, manifold) = self.select_excited_state(&es, iteration)?;
                (Some((es, candidate)), Some(manifold))
            }
            None => (None, None),
        };
        let excited_energy = excited.map(|(_, c)| c.energy).unwrap_or_default();

        let multipoles = self.analyze_multipoles(job, iteration, &result)?;
        let charges = match self.derive_charges(job, iteration, qm_atoms, &result, excited)? {
            Some(fitted) => fitted,
            None => match &multipoles {
                Some(m) => m.iter().map(|site| site.charge).collect(),
                None => result.charges(),
            },
        };
        let residuals = job
            .region_mut()
            .update_qm_core(&result.positions(), &charges)
            .map_err(|e| EngineError::ChargeProjection {
                iteration,
                reason: e.to_string(),
            })?;
        if let Some(multipoles) = multipoles {
            for (site, m) in job.region_mut().qm_core_sites_mut().zip(multipoles) {
                site.dipole = m.dipole;
            }
        }

        let qm = QmEnergies {
            electronic: result.electronic_energy(),
            self_field: result.self_energy,
            excited: excited_energy,
        };
        let record = IterationRecord::new(iteration, qm, classical, residuals);
        job.set_energies(JobEnergies {
            qm: qm.electronic,
            self_field: qm.self_field,
            excited: qm.excited,
            qmmm: record.qmmm_energy(),
        });

        if self.config.archive_iterations {
            self.archive(job, iteration, &run_dir, &result, manifold.as_ref())?;
        }
        self.history.push(record);

        info!(
            iteration,
            "Summary: E_QM={:+.8e} E_SF={:+.8e} E_EX={:+.8e} E_MM={:+.8e} E_QMMM={:+.8e}",
            record.qm_energy(),
            qm.self_field,
            qm.excited,
            record.mm_energy(),
            record.qmmm_energy()
        );
        info!(
            iteration,
            "Residuals: RMS(dR)={:.4e} RMS(dQ)={:.4e} SUM(dQ)={:+.4e}",
            residuals.position_rms,
            residuals.charge_rms,
            residuals.charge_sum
        );

        if let Err(e) = self.collaborators.qm_engine.clean_up() {
            warn!(iteration, "QM engine clean-up failed: {}", e);
        }
        self.current = Some(result);
        Ok(record)
    }

    fn induce(
        &mut self,
        job: &mut JobContext,
        iteration: usize,
    ) -> Result<ClassicalEnergies, EngineError> {
        if !job.mode().is_polarizable() {
            return Ok(ClassicalEnergies::default());
        }
        let inductor = self
            .collaborators
            .inductor
            .as_mut()
            .ok_or(ConfigError::MissingParameter("inductor"))?;

        inductor
            .evaluate(job)
            .map_err(|e| EngineError::ClassicalNonConvergence {
                iteration,
                detail: e.to_string(),
            })?;
        if !inductor.has_converged() {
            return Err(EngineError::ClassicalNonConvergence {
                iteration,
                detail: "induction did not reach self-consistency".into(),
            });
        }
        let energies = inductor.energies();
        debug!(
            iteration,
            "Classical energies: F00={:+.6e} F01={:+.6e} F02={:+.6e} F11={:+.6e} F12={:+.6e} M0={:+.6e} M1={:+.6e} M2={:+.6e} FM={:+.6e}",
            energies.f00,
            energies.f01,
            energies.f02,
            energies.f11,
            energies.f12,
            energies.m0,
            energies.m1,
            energies.m2,
            energies.field_total
        );
        Ok(energies)
    }

    fn select_excited_state(
        &mut self,
        es: &ExcitedStateConfig,
        iteration: usize,
    ) -> Result<(ExcitedStateCandidate, ExcitedManifold), EngineError> {
        let candidates = self
            .collaborators
            .qm_engine
            .compute_excited_states(es.kind)
            .map_err(|e| EngineError::SolverRunFailure {
                iteration,
                reason: e.to_string(),
            })?;

        let selection = ExcitedStateSelector::from_config(es).select(&candidates);
        for diagnostic in &selection.diagnostics {
            match diagnostic {
                SelectionDiagnostic::FilterYieldedEmpty => warn!(
                    iteration,
                    "No {} state passed the filters; falling back to the first state.", es.kind
                ),
                SelectionDiagnostic::InconsistentFilterCombination => warn!(
                    iteration,
                    "Filtering by oscillator strength and charge transfer at once may be inconsistent."
                ),
            }
            self.diagnostics.push((iteration, *diagnostic));
        }

        let unavailable = || EngineError::ExcitedStateUnavailable {
            iteration,
            requested: es.state,
            available: selection.indices.len().min(candidates.len()),
        };
        let position = *selection.indices.get(es.state - 1).ok_or_else(unavailable)?;
        let candidate = *candidates.get(position).ok_or_else(unavailable)?;
        info!(
            iteration,
            "Selected {} state {} (engine index {}): E={:+.6e} f={:.4} CT={:+.4}",
            es.kind,
            es.state,
            candidate.index,
            candidate.energy,
            candidate.oscillator_strength,
            candidate.charge_transfer
        );
        Ok((
            candidate,
            ExcitedManifold {
                kind: es.kind,
                states: candidates,
            },
        ))
    }

    fn derive_charges(
        &self,
        job: &JobContext,
        iteration: usize,
        qm_atoms: &[QmAtom],
        result: &QmResult,
        excited: Option<(ExcitedStateConfig, ExcitedStateCandidate)>,
    ) -> Result<Option<Vec<f64>>, EngineError> {
        let projection_error = |reason: String| EngineError::ChargeProjection { iteration, reason };

        let projector = match &self.collaborators.charge_projector {
            Some(p) if job.mode().is_polarizable() => p,
            _ => return Ok(None),
        };

        let ground = result
            .ground_state_density
            .as_ref()
            .ok_or_else(|| projection_error("QM result carries no density matrix".into()))?;
        let basis = result
            .basis
            .as_ref()
            .ok_or_else(|| projection_error("QM result carries no basis description".into()))?;

        let density = match excited {
            Some((es, candidate)) => {
                let transition = self
                    .collaborators
                    .qm_engine
                    .excited_state_density(es.kind, candidate.index)
                    .map_err(|e| projection_error(e.to_string()))?;
                excited_density(ground, &transition).map_err(projection_error)?
            }
            None => ground.clone(),
        };

        projector
            .fit(qm_atoms, &density, basis)
            .map(Some)
            .map_err(|e| projection_error(e.to_string()))
    }

    /// Point multipoles of the QM core sites, when an analyzer is configured.
    fn analyze_multipoles(
        &self,
        job: &JobContext,
        iteration: usize,
        result: &QmResult,
    ) -> Result<Option<Vec<SiteMultipoles>>, EngineError> {
        let Some(analyzer) = &self.collaborators.multipole_analyzer else {
            return Ok(None);
        };
        let multipoles = analyzer
            .analyze(result)
            .map_err(|e| EngineError::ChargeProjection {
                iteration,
                reason: e.to_string(),
            })?;
        let expected = job.region().qm_core_sites().count();
        if multipoles.len() != expected {
            return Err(EngineError::ChargeProjection {
                iteration,
                reason: format!(
                    "multipole analysis returned {} sites, expected {}",
                    multipoles.len(),
                    expected
                ),
            });
        }
        Ok(Some(multipoles))
    }

    fn archive(
        &self,
        job: &JobContext,
        iteration: usize,
        run_dir: &Path,
        result: &QmResult,
        excited: Option<&ExcitedManifold>,
    ) -> Result<(), EngineError> {
        let Some(writer) = &self.collaborators.archive else {
            debug!(iteration, "Archiving enabled but no archive writer configured.");
            return Ok(());
        };
        let id = SnapshotId {
            job_id: job.id(),
            iteration,
            run_dir: run_dir.to_path_buf(),
        };
        writer
            .save(&id, result, excited)
            .map_err(|e| EngineError::Archive {
                iteration,
                reason: e.to_string(),
            })
    }
}

/// Density of an excited state: ground state minus hole plus electron.
fn excited_density(
    ground: &DMatrix<f64>,
    transition: &TransitionDensity,
) -> Result<DMatrix<f64>, String> {
    let shape = ground.shape();
    if transition.hole.shape() != shape || transition.electron.shape() != shape {
        return Err(format!(
            "density shapes differ: ground {:?}, hole {:?}, electron {:?}",
            shape,
            transition.hole.shape(),
            transition.electron.shape()
        ));
    }
    Ok(ground - &transition.hole + &transition.electron)
}
