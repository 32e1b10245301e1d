use super::config::{ConvergenceCriteria, CouplingMode, EngineConfig};
use super::error::EngineError;
use crate::core::models::region::EmbeddedRegion;
use std::path::{Path, PathBuf};

/// Energies written back into the job after each outer iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JobEnergies {
    pub qm: f64,
    pub self_field: f64,
    pub excited: f64,
    pub qmmm: f64,
}

/// Per-job state handed to the orchestrator and its collaborators.
#[derive(Debug, Clone)]
pub struct JobContext {
    id: u64,
    tag: String,
    region: EmbeddedRegion,
    charge: i32,
    multiplicity: u32,
    work_dir: PathBuf,
    criteria: ConvergenceCriteria,
    mode: CouplingMode,
    energies: JobEnergies,
}

impl JobContext {
    /// Binds an embedded region to an engine configuration.
    ///
    /// The net charge and multiplicity are derived from the QM core charges
    /// here and stay fixed for the lifetime of the job.
    ///
    /// # Errors
    ///
    /// Fails if the QM core has no sites or contains an element the QM
    /// engines cannot represent.
    pub fn new(
        id: u64,
        tag: &str,
        region: EmbeddedRegion,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        if region.is_empty() {
            return Err(EngineError::Internal(format!(
                "job {id} ({tag}) has an empty QM core"
            )));
        }
        region.qm_atoms()?;

        let (charge, multiplicity) = charge_and_multiplicity(region.qm_core_charge());
        Ok(Self {
            id,
            tag: tag.to_string(),
            work_dir: config.work_dir.join(job_dir_name(id, tag)),
            region,
            charge,
            multiplicity,
            criteria: config.convergence,
            mode: config.mode,
            energies: JobEnergies::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn tag(&self) -> &str {
        &self.tag
    }
    pub fn region(&self) -> &EmbeddedRegion {
        &self.region
    }
    /// Mutable access for collaborators that update the classical shells.
    pub fn region_mut(&mut self) -> &mut EmbeddedRegion {
        &mut self.region
    }
    pub fn charge(&self) -> i32 {
        self.charge
    }
    pub fn multiplicity(&self) -> u32 {
        self.multiplicity
    }
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
    pub fn criteria(&self) -> &ConvergenceCriteria {
        &self.criteria
    }
    pub fn mode(&self) -> CouplingMode {
        self.mode
    }
    pub fn energies(&self) -> JobEnergies {
        self.energies
    }

    pub(crate) fn set_energies(&mut self, energies: JobEnergies) {
        self.energies = energies;
    }

    /// Run directory of the given outer iteration.
    pub fn iteration_dir(&self, iteration: usize) -> PathBuf {
        self.work_dir.join(format!("iter_{iteration}"))
    }
}

/// Net charge rounded to the nearest integer and the lowest spin
/// multiplicity compatible with it.
pub fn charge_and_multiplicity(total_charge: f64) -> (i32, u32) {
    let charge = total_charge.round() as i32;
    let multiplicity = charge.unsigned_abs() % 2 + 1;
    (charge, multiplicity)
}

/// Directory name of a job; path separators and whitespace in the tag are
/// replaced so that the name stays a single path component.
pub fn job_dir_name(id: u64, tag: &str) -> String {
    let tag: String = tag
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("xjob_{id}_{tag}")
}
