//! Interfaces of the external programs the orchestrator drives, and the
//! values exchanged with them.

use super::config::ExcitationKind;
use super::context::JobContext;
use super::record::ClassicalEnergies;
use crate::core::models::atom::QmAtom;
use crate::core::models::site::PolarSite;
use nalgebra::{DMatrix, Point3, Vector3};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed exchange file '{path}': {reason}")]
    Exchange { path: PathBuf, reason: String },

    #[error("Program '{program}' exited unsuccessfully ({status}); see '{log}'")]
    Process {
        program: String,
        status: String,
        log: PathBuf,
    },

    #[error("{0}")]
    Message(String),
}

impl CollaboratorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CollaboratorError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Name of the basis set used by the QM engine, needed to fit charges to a density.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasisDescription {
    pub name: String,
    pub uses_ecp: bool,
}

/// Ground-state result of one QM run.
#[derive(Debug, Clone, PartialEq)]
pub struct QmResult {
    /// Energy of the QM core including its self-field interaction.
    pub total_energy: f64,
    /// Self-field contribution contained in `total_energy`.
    pub self_energy: f64,
    /// QM core atoms with the positions and charges reported by the engine,
    /// in the order they were handed to [`QmEngine::prepare`].
    pub atoms: Vec<QmAtom>,
    pub ground_state_density: Option<DMatrix<f64>>,
    pub basis: Option<BasisDescription>,
}

impl QmResult {
    pub fn electronic_energy(&self) -> f64 {
        self.total_energy - self.self_energy
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    pub fn charges(&self) -> Vec<f64> {
        self.atoms.iter().map(|a| a.charge).collect()
    }
}

/// One computed excited state, as produced by the QM engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExcitedStateCandidate {
    /// Position of the state in the engine's own ordering.
    pub index: usize,
    pub oscillator_strength: f64,
    /// Signed charge-transfer character; filters compare its magnitude.
    pub charge_transfer: f64,
    pub energy: f64,
}

/// All excited states of one spin manifold computed in an iteration, in engine order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcitedManifold {
    pub kind: ExcitationKind,
    pub states: Vec<ExcitedStateCandidate>,
}

/// Hole and electron densities of an excitation, in the basis of the ground-state density.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionDensity {
    pub hole: DMatrix<f64>,
    pub electron: DMatrix<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteMultipoles {
    pub charge: f64,
    pub dipole: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotId {
    pub job_id: u64,
    pub iteration: usize,
    pub run_dir: PathBuf,
}

/// Classical polarization solver acting on the shells of a job.
pub trait Inductor: Send {
    /// Updates the induced multipoles of the classical shells in place.
    fn evaluate(&mut self, job: &mut JobContext) -> Result<(), CollaboratorError>;
    /// Whether the last call to [`Inductor::evaluate`] reached self-consistency.
    fn has_converged(&self) -> bool;
    fn energies(&self) -> ClassicalEnergies;
}

/// A quantum-chemistry program. Backends are selected by configuration.
pub trait QmEngine: Send {
    fn name(&self) -> &str;

    fn set_charge_and_multiplicity(&mut self, charge: i32, multiplicity: u32);

    /// Writes everything the next run needs into `run_dir`.
    fn prepare(
        &mut self,
        run_dir: &Path,
        core: &[QmAtom],
        background: &[PolarSite],
    ) -> Result<(), CollaboratorError>;

    fn run(&mut self) -> Result<(), CollaboratorError>;

    fn parse_result(&mut self) -> Result<QmResult, CollaboratorError>;

    fn compute_excited_states(
        &mut self,
        kind: ExcitationKind,
    ) -> Result<Vec<ExcitedStateCandidate>, CollaboratorError>;

    /// Densities of the excited state at `index` of the last
    /// [`QmEngine::compute_excited_states`] call.
    fn excited_state_density(
        &self,
        kind: ExcitationKind,
        index: usize,
    ) -> Result<TransitionDensity, CollaboratorError>;

    /// Removes scratch files of the last run.
    fn clean_up(&mut self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// Fits point charges on the QM atoms to a density matrix.
pub trait ChargeProjector: Send {
    fn fit(
        &self,
        atoms: &[QmAtom],
        density: &DMatrix<f64>,
        basis: &BasisDescription,
    ) -> Result<Vec<f64>, CollaboratorError>;
}

/// Derives per-atom multipoles from a QM result.
pub trait MultipoleAnalyzer: Send {
    fn analyze(&self, result: &QmResult) -> Result<Vec<SiteMultipoles>, CollaboratorError>;
}

/// Persists the QM result of an iteration.
pub trait ArchiveWriter: Send {
    /// `excited` holds the excited states computed in the iteration, if any were requested.
    fn save(
        &self,
        id: &SnapshotId,
        result: &QmResult,
        excited: Option<&ExcitedManifold>,
    ) -> Result<(), CollaboratorError>;
}

/// The external collaborators of one job.
///
/// Each job owns its own instances, so jobs never share mutable state.
pub struct Collaborators {
    pub qm_engine: Box<dyn QmEngine>,
    pub inductor: Option<Box<dyn Inductor>>,
    pub charge_projector: Option<Box<dyn ChargeProjector>>,
    pub multipole_analyzer: Option<Box<dyn MultipoleAnalyzer>>,
    pub archive: Option<Box<dyn ArchiveWriter>>,
}

impl Collaborators {
    pub fn new(qm_engine: Box<dyn QmEngine>) -> Self {
        Self {
            qm_engine,
            inductor: None,
            charge_projector: None,
            multipole_analyzer: None,
            archive: None,
        }
    }

    pub fn with_inductor(mut self, inductor: Box<dyn Inductor>) -> Self {
        self.inductor = Some(inductor);
        self
    }

    pub fn with_charge_projector(mut self, projector: Box<dyn ChargeProjector>) -> Self {
        self.charge_projector = Some(projector);
        self
    }

    pub fn with_multipole_analyzer(mut self, analyzer: Box<dyn MultipoleAnalyzer>) -> Self {
        self.multipole_analyzer = Some(analyzer);
        self
    }

    pub fn with_archive(mut self, archive: Box<dyn ArchiveWriter>) -> Self {
        self.archive = Some(archive);
        self
    }
}
