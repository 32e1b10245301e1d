use super::output::QmOutput;
use crate::core::io::exchange::{
    INDUCTOR_INPUT_FILE, INDUCTOR_RESULT_FILE, InductorInput, InductorResult, QM_INPUT_FILE,
    QM_RESULT_FILE, QmInput, SegmentRecord, SiteRecord, read_toml, write_toml,
};
use crate::core::models::atom::QmAtom;
use crate::core::models::region::Shell;
use crate::core::models::site::PolarSite;
use crate::engine::collaborators::{
    CollaboratorError, ExcitedStateCandidate, Inductor, QmEngine, QmResult, TransitionDensity,
};
use crate::engine::config::ExcitationKind;
use crate::engine::context::JobContext;
use crate::engine::record::ClassicalEnergies;
use nalgebra::Vector3;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

const SHELLS: [Shell; 3] = [Shell::QmCore, Shell::NearField, Shell::FarField];

/// A program invocation, run inside a working directory with its output
/// captured in a log file there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProgram {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExternalProgram {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn run_in(&self, dir: &Path, log_name: &str) -> Result<(), CollaboratorError> {
        let log_path = dir.join(log_name);
        let stdout = File::create(&log_path).map_err(|e| CollaboratorError::io(&log_path, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| CollaboratorError::io(&log_path, e))?;

        debug!(program = %self.program.display(), dir = %dir.display(), "Launching external program.");
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|e| CollaboratorError::io(&self.program, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(CollaboratorError::Process {
                program: self.program.display().to_string(),
                status: status.to_string(),
                log: log_path,
            })
        }
    }
}

/// QM engine backed by an external program speaking the TOML exchange format.
pub struct ExternalQmEngine {
    program: ExternalProgram,
    charge: i32,
    multiplicity: u32,
    run_dir: Option<PathBuf>,
    output: Option<QmOutput>,
}

impl ExternalQmEngine {
    pub fn new(program: ExternalProgram) -> Self {
        Self {
            program,
            charge: 0,
            multiplicity: 1,
            run_dir: None,
            output: None,
        }
    }

    fn run_dir(&self) -> Result<&Path, CollaboratorError> {
        self.run_dir
            .as_deref()
            .ok_or_else(|| CollaboratorError::Message("QM engine used before prepare".into()))
    }

    fn output(&self) -> Result<&QmOutput, CollaboratorError> {
        self.output
            .as_ref()
            .ok_or_else(|| CollaboratorError::Message("no parsed QM result available".into()))
    }
}

impl QmEngine for ExternalQmEngine {
    fn name(&self) -> &str {
        "external"
    }

    fn set_charge_and_multiplicity(&mut self, charge: i32, multiplicity: u32) {
        self.charge = charge;
        self.multiplicity = multiplicity;
    }

    fn prepare(
        &mut self,
        run_dir: &Path,
        core: &[QmAtom],
        background: &[PolarSite],
    ) -> Result<(), CollaboratorError> {
        let input = QmInput {
            charge: self.charge,
            multiplicity: self.multiplicity,
            atoms: core
                .iter()
                .map(|a| SiteRecord {
                    element: a.element.clone(),
                    position: [a.position.x, a.position.y, a.position.z],
                    charge: a.charge,
                    dipole: [0.0; 3],
                })
                .collect(),
            background: background.iter().map(SiteRecord::from).collect(),
        };
        let path = run_dir.join(QM_INPUT_FILE);
        write_toml(&path, &input).map_err(|e| CollaboratorError::Exchange {
            path,
            reason: e.to_string(),
        })?;
        self.run_dir = Some(run_dir.to_path_buf());
        self.output = None;
        Ok(())
    }

    fn run(&mut self) -> Result<(), CollaboratorError> {
        self.program.run_in(self.run_dir()?, "qm.log")
    }

    fn parse_result(&mut self) -> Result<QmResult, CollaboratorError> {
        let output = QmOutput::read(&self.run_dir()?.join(QM_RESULT_FILE))?;
        let result = output.result().clone();
        self.output = Some(output);
        Ok(result)
    }

    fn compute_excited_states(
        &mut self,
        kind: ExcitationKind,
    ) -> Result<Vec<ExcitedStateCandidate>, CollaboratorError> {
        Ok(self.output()?.candidates(kind))
    }

    fn excited_state_density(
        &self,
        kind: ExcitationKind,
        index: usize,
    ) -> Result<TransitionDensity, CollaboratorError> {
        self.output()?.density(kind, index)
    }
}

/// Classical polarization solver backed by an external program.
///
/// Each call writes all three shells to the current iteration directory and
/// applies the charges and dipoles returned by the program to the matching
/// segments.
pub struct ExternalInductor {
    program: ExternalProgram,
    calls: usize,
    converged: bool,
    energies: ClassicalEnergies,
}

impl ExternalInductor {
    pub fn new(program: ExternalProgram) -> Self {
        Self {
            program,
            calls: 0,
            converged: false,
            energies: ClassicalEnergies::default(),
        }
    }
}

impl Inductor for ExternalInductor {
    fn evaluate(&mut self, job: &mut JobContext) -> Result<(), CollaboratorError> {
        let dir = job.iteration_dir(self.calls);
        self.calls += 1;
        self.converged = false;

        let region = job.region();
        let input = InductorInput {
            segments: SHELLS
                .iter()
                .flat_map(|&shell| {
                    region
                        .shell(shell)
                        .iter()
                        .map(move |seg| SegmentRecord::from_segment(shell, seg))
                })
                .collect(),
        };
        let input_path = dir.join(INDUCTOR_INPUT_FILE);
        write_toml(&input_path, &input).map_err(|e| CollaboratorError::Exchange {
            path: input_path,
            reason: e.to_string(),
        })?;

        self.program.run_in(&dir, "inductor.log")?;

        let result_path = dir.join(INDUCTOR_RESULT_FILE);
        let result: InductorResult =
            read_toml(&result_path).map_err(|e| CollaboratorError::Exchange {
                path: result_path.clone(),
                reason: e.to_string(),
            })?;
        apply_segments(job, &result.segments).map_err(|reason| CollaboratorError::Exchange {
            path: result_path,
            reason,
        })?;

        let e = result.energies;
        self.energies = ClassicalEnergies {
            f00: e.f00,
            f01: e.f01,
            f02: e.f02,
            f11: e.f11,
            f12: e.f12,
            m0: e.m0,
            m1: e.m1,
            m2: e.m2,
            field_total: e.field_total,
        };
        self.converged = result.converged;
        Ok(())
    }

    fn has_converged(&self) -> bool {
        self.converged
    }

    fn energies(&self) -> ClassicalEnergies {
        self.energies
    }
}

/// Copies induced moments back into the environment shells.
///
/// QM-core segments are sent as fixed sources only; any the program echoes back are skipped
/// so the core keeps the charges the QM step assigned.
fn apply_segments(job: &mut JobContext, updates: &[SegmentRecord]) -> Result<(), String> {
    for update in updates {
        if update.shell == Shell::QmCore {
            debug!(segment = update.id, "Ignoring QM-core segment in inductor result.");
            continue;
        }
        let segment = job
            .region_mut()
            .shell_mut(update.shell)
            .iter_mut()
            .find(|s| s.id == update.id)
            .ok_or_else(|| format!("unknown {:?} segment {}", update.shell, update.id))?;
        if segment.sites.len() != update.sites.len() {
            return Err(format!(
                "segment {} has {} sites, result lists {}",
                update.id,
                segment.sites.len(),
                update.sites.len()
            ));
        }
        for (site, record) in segment.sites.iter_mut().zip(&update.sites) {
            let [dx, dy, dz] = record.dipole;
            site.charge = record.charge;
            site.dipole = Vector3::new(dx, dy, dz);
        }
    }
    Ok(())
}
