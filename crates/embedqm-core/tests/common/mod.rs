#![allow(dead_code)]

use embedqm::core::models::atom::QmAtom;
use embedqm::core::models::region::EmbeddedRegion;
use embedqm::core::models::segment::PolarSegment;
use embedqm::core::models::site::PolarSite;
use embedqm::engine::collaborators::{
    BasisDescription, ChargeProjector, CollaboratorError, ExcitedStateCandidate, Inductor,
    MultipoleAnalyzer, QmEngine, QmResult, SiteMultipoles, TransitionDensity,
};
use embedqm::engine::config::ExcitationKind;
use embedqm::engine::context::JobContext;
use embedqm::engine::record::ClassicalEnergies;
use nalgebra::{DMatrix, Point3, Vector3};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub fn region() -> EmbeddedRegion {
    EmbeddedRegion::new(
        vec![PolarSegment::new(
            1,
            "CORE",
            vec![
                PolarSite::new("C", Point3::new(0.0, 0.0, 0.0), 0.0),
                PolarSite::new("O", Point3::new(1.2, 0.0, 0.0), 0.0),
            ],
        )],
        vec![PolarSegment::new(
            2,
            "NEAR",
            vec![PolarSite::new("N", Point3::new(6.0, 0.0, 0.0), -0.2)],
        )],
        vec![PolarSegment::new(
            3,
            "FAR",
            vec![PolarSite::new("H", Point3::new(20.0, 0.0, 0.0), 0.2)],
        )],
    )
}

/// QM engine whose results drift by a geometrically shrinking step each run.
///
/// Run `i` shifts every QM atom by `step_i` along x and every charge by
/// `step_i`, where `step_i = start * ratio^i`, and reports an electronic
/// energy of `energy_scale * ratio^i`.
pub struct ScriptedQmEngine {
    pub start: f64,
    pub ratio: f64,
    pub energy_scale: f64,
    pub fail_run: bool,
    pub fail_parse: bool,
    pub excited: Vec<ExcitedStateCandidate>,
    pub density_dim: Option<usize>,
    pub charge_and_multiplicity: Arc<Mutex<Option<(i32, u32)>>>,
    pub prepared_backgrounds: Arc<Mutex<Vec<usize>>>,
    runs: usize,
    base: Vec<QmAtom>,
    cumulative: f64,
}

impl ScriptedQmEngine {
    pub fn geometric() -> Self {
        Self {
            start: 1.0,
            ratio: 0.5,
            energy_scale: 0.1,
            fail_run: false,
            fail_parse: false,
            excited: Vec::new(),
            density_dim: None,
            charge_and_multiplicity: Arc::new(Mutex::new(None)),
            prepared_backgrounds: Arc::new(Mutex::new(Vec::new())),
            runs: 0,
            base: Vec::new(),
            cumulative: 0.0,
        }
    }

    pub fn failing_run() -> Self {
        Self {
            fail_run: true,
            ..Self::geometric()
        }
    }

    pub fn failing_parse() -> Self {
        Self {
            fail_parse: true,
            ..Self::geometric()
        }
    }

    fn step(&self, run: usize) -> f64 {
        self.start * self.ratio.powi(run as i32)
    }
}

impl QmEngine for ScriptedQmEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn set_charge_and_multiplicity(&mut self, charge: i32, multiplicity: u32) {
        *self.charge_and_multiplicity.lock().unwrap() = Some((charge, multiplicity));
    }

    fn prepare(
        &mut self,
        run_dir: &Path,
        core: &[QmAtom],
        background: &[PolarSite],
    ) -> Result<(), CollaboratorError> {
        assert!(run_dir.is_dir(), "run directory must exist before prepare");
        if self.base.is_empty() {
            self.base = core.to_vec();
        }
        self.prepared_backgrounds
            .lock()
            .unwrap()
            .push(background.len());
        Ok(())
    }

    fn run(&mut self) -> Result<(), CollaboratorError> {
        if self.fail_run {
            return Err(CollaboratorError::Message("synthetic run failure".into()));
        }
        self.cumulative += self.step(self.runs);
        self.runs += 1;
        Ok(())
    }

    fn parse_result(&mut self) -> Result<QmResult, CollaboratorError> {
        if self.fail_parse {
            return Err(CollaboratorError::Message("synthetic parse failure".into()));
        }
        let run = self.runs - 1;
        let atoms = self
            .base
            .iter()
            .map(|a| {
                let mut atom = a.clone();
                atom.position.x += self.cumulative;
                atom.charge += self.cumulative;
                atom
            })
            .collect();
        Ok(QmResult {
            total_energy: self.energy_scale * self.ratio.powi(run as i32),
            self_energy: 0.0,
            atoms,
            ground_state_density: self.density_dim.map(|n| DMatrix::identity(n, n)),
            basis: self.density_dim.map(|_| BasisDescription {
                name: "sto-3g".into(),
                uses_ecp: false,
            }),
        })
    }

    fn compute_excited_states(
        &mut self,
        _kind: ExcitationKind,
    ) -> Result<Vec<ExcitedStateCandidate>, CollaboratorError> {
        Ok(self.excited.clone())
    }

    fn excited_state_density(
        &self,
        _kind: ExcitationKind,
        _index: usize,
    ) -> Result<TransitionDensity, CollaboratorError> {
        let n = self
            .density_dim
            .ok_or_else(|| CollaboratorError::Message("no density".into()))?;
        let mut hole = DMatrix::zeros(n, n);
        let mut electron = DMatrix::zeros(n, n);
        hole[(0, 0)] = 1.0;
        electron[(n - 1, n - 1)] = 1.0;
        Ok(TransitionDensity { hole, electron })
    }
}

/// Inductor whose classical energy shrinks with the same ratio as the QM engine.
pub struct ScriptedInductor {
    pub converges: bool,
    pub energy_scale: f64,
    pub ratio: f64,
    calls: usize,
}

impl ScriptedInductor {
    pub fn geometric() -> Self {
        Self {
            converges: true,
            energy_scale: 0.1,
            ratio: 0.5,
            calls: 0,
        }
    }

    pub fn never_converging() -> Self {
        Self {
            converges: false,
            ..Self::geometric()
        }
    }
}

impl Inductor for ScriptedInductor {
    fn evaluate(&mut self, job: &mut JobContext) -> Result<(), CollaboratorError> {
        assert!(!job.region().is_empty());
        self.calls += 1;
        Ok(())
    }

    fn has_converged(&self) -> bool {
        self.converges
    }

    fn energies(&self) -> ClassicalEnergies {
        let scale = self.energy_scale * self.ratio.powi(self.calls as i32 - 1);
        ClassicalEnergies {
            m1: scale,
            field_total: scale,
            ..Default::default()
        }
    }
}

/// Charge projector that remembers the densities it was given.
pub struct RecordingProjector {
    pub charges: Vec<f64>,
    pub densities: Arc<Mutex<Vec<DMatrix<f64>>>>,
}

impl ChargeProjector for RecordingProjector {
    fn fit(
        &self,
        atoms: &[QmAtom],
        density: &DMatrix<f64>,
        basis: &BasisDescription,
    ) -> Result<Vec<f64>, CollaboratorError> {
        assert_eq!(atoms.len(), self.charges.len());
        assert_eq!(basis.name, "sto-3g");
        self.densities.lock().unwrap().push(density.clone());
        Ok(self.charges.clone())
    }
}

/// Multipole analyzer assigning the same charge and dipole to a fixed number of sites.
pub struct FixedMultipoleAnalyzer {
    pub sites: usize,
    pub charge: f64,
    pub dipole: Vector3<f64>,
}

impl MultipoleAnalyzer for FixedMultipoleAnalyzer {
    fn analyze(&self, _result: &QmResult) -> Result<Vec<SiteMultipoles>, CollaboratorError> {
        Ok(vec![
            SiteMultipoles {
                charge: self.charge,
                dipole: self.dipole,
            };
            self.sites
        ])
    }
}
