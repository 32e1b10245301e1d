use super::atom::{ElementError, QmAtom};
use super::segment::PolarSegment;
use super::site::PolarSite;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three concentric shells of an embedded region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shell {
    /// Segments treated quantum-mechanically.
    QmCore,
    /// Polarizable classical shell directly around the QM core.
    NearField,
    /// Outer classical shell, typically kept at permanent multipoles.
    FarField,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegionError {
    #[error("Expected {expected} QM core sites, got {actual}")]
    SiteCountMismatch { expected: usize, actual: usize },
}

/// Root-mean-square and total displacement of the QM core between two
/// consecutive iterations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Displacement {
    /// RMS of the positional shift of each site, in Angstroms.
    pub position_rms: f64,
    /// RMS of the charge change of each site, in elementary charge units.
    pub charge_rms: f64,
    /// Net change of the total QM core charge.
    pub charge_sum: f64,
}

/// A QM core embedded in two classical shells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddedRegion {
    qm_core: Vec<PolarSegment>,
    near_field: Vec<PolarSegment>,
    far_field: Vec<PolarSegment>,
}

impl EmbeddedRegion {
    pub fn new(
        qm_core: Vec<PolarSegment>,
        near_field: Vec<PolarSegment>,
        far_field: Vec<PolarSegment>,
    ) -> Self {
        Self {
            qm_core,
            near_field,
            far_field,
        }
    }

    pub fn shell(&self, shell: Shell) -> &[PolarSegment] {
        match shell {
            Shell::QmCore => &self.qm_core,
            Shell::NearField => &self.near_field,
            Shell::FarField => &self.far_field,
        }
    }

    pub fn shell_mut(&mut self, shell: Shell) -> &mut Vec<PolarSegment> {
        match shell {
            Shell::QmCore => &mut self.qm_core,
            Shell::NearField => &mut self.near_field,
            Shell::FarField => &mut self.far_field,
        }
    }

    /// Number of segments in each shell, ordered core, near, far.
    pub fn shell_sizes(&self) -> (usize, usize, usize) {
        (
            self.qm_core.len(),
            self.near_field.len(),
            self.far_field.len(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.qm_core_sites().next().is_none()
    }

    pub fn qm_core_sites(&self) -> impl Iterator<Item = &PolarSite> {
        self.qm_core.iter().flat_map(|seg| seg.sites.iter())
    }

    pub fn qm_core_sites_mut(&mut self) -> impl Iterator<Item = &mut PolarSite> {
        self.qm_core.iter_mut().flat_map(|seg| seg.sites.iter_mut())
    }

    /// Sites of the near- and far-field shells, in that order.
    pub fn background_sites(&self) -> impl Iterator<Item = &PolarSite> {
        self.near_field
            .iter()
            .chain(self.far_field.iter())
            .flat_map(|seg| seg.sites.iter())
    }

    pub fn qm_core_charge(&self) -> f64 {
        self.qm_core.iter().map(PolarSegment::total_charge).sum()
    }

    /// Translates the QM core sites into the atom representation used by
    /// quantum-chemistry engines.
    pub fn qm_atoms(&self) -> Result<Vec<QmAtom>, ElementError> {
        self.qm_core_sites().map(QmAtom::from_site).collect()
    }

    /// Overwrites the QM core positions and charges with QM-derived values and
    /// reports how far they moved.
    pub fn update_qm_core(
        &mut self,
        positions: &[Point3<f64>],
        charges: &[f64],
    ) -> Result<Displacement, RegionError> {
        let expected = self.qm_core_sites().count();
        for actual in [positions.len(), charges.len()] {
            if actual != expected {
                return Err(RegionError::SiteCountMismatch { expected, actual });
            }
        }
        if expected == 0 {
            return Ok(Displacement::default());
        }

        let mut sum_dr2 = 0.0;
        let mut sum_dq2 = 0.0;
        let mut sum_dq = 0.0;
        for ((site, new_pos), &new_charge) in self
            .qm_core_sites_mut()
            .zip(positions.iter())
            .zip(charges.iter())
        {
            let dq = new_charge - site.charge;
            sum_dr2 += (*new_pos - site.position).norm_squared();
            sum_dq2 += dq * dq;
            sum_dq += dq;
            site.position = *new_pos;
            site.charge = new_charge;
        }

        let n = expected as f64;
        Ok(Displacement {
            position_rms: (sum_dr2 / n).sqrt(),
            charge_rms: (sum_dq2 / n).sqrt(),
            charge_sum: sum_dq,
        })
    }
}
