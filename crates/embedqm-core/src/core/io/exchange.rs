//! TOML files exchanged with external QM and classical programs.
//!
//! Every run directory holds one input file written by embedqm and one result
//! file written by the external program. Keys are kebab-case; unknown keys are
//! rejected so that version drift between the two sides fails loudly.

use crate::core::models::region::Shell;
use crate::core::models::segment::PolarSegment;
use crate::core::models::site::PolarSite;
use nalgebra::{DMatrix, Point3, Vector3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const QM_INPUT_FILE: &str = "qm-input.toml";
pub const QM_RESULT_FILE: &str = "qm-result.toml";
pub const INDUCTOR_INPUT_FILE: &str = "inductor-input.toml";
pub const INDUCTOR_RESULT_FILE: &str = "inductor-result.toml";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize '{path}': {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("Invalid content in '{path}': {reason}")]
    Invalid { path: PathBuf, reason: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SiteRecord {
    pub element: String,
    pub position: [f64; 3],
    #[serde(default)]
    pub charge: f64,
    #[serde(default)]
    pub dipole: [f64; 3],
}

impl From<&PolarSite> for SiteRecord {
    fn from(site: &PolarSite) -> Self {
        Self {
            element: site.element.clone(),
            position: [site.position.x, site.position.y, site.position.z],
            charge: site.charge,
            dipole: [site.dipole.x, site.dipole.y, site.dipole.z],
        }
    }
}

impl From<SiteRecord> for PolarSite {
    fn from(record: SiteRecord) -> Self {
        let [x, y, z] = record.position;
        let [dx, dy, dz] = record.dipole;
        PolarSite::new(&record.element, Point3::new(x, y, z), record.charge)
            .with_dipole(Vector3::new(dx, dy, dz))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SegmentRecord {
    pub shell: Shell,
    pub id: usize,
    pub name: String,
    pub sites: Vec<SiteRecord>,
}

impl SegmentRecord {
    pub fn from_segment(shell: Shell, segment: &PolarSegment) -> Self {
        Self {
            shell,
            id: segment.id,
            name: segment.name.clone(),
            sites: segment.sites.iter().map(SiteRecord::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct QmInput {
    pub charge: i32,
    pub multiplicity: u32,
    #[serde(default, rename = "atom")]
    pub atoms: Vec<SiteRecord>,
    #[serde(default, rename = "background")]
    pub background: Vec<SiteRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct BasisRecord {
    pub name: String,
    #[serde(default)]
    pub ecp: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ExcitedStateRecord {
    /// `"singlet"` or `"triplet"`.
    pub kind: String,
    pub energy: f64,
    #[serde(default)]
    pub oscillator_strength: f64,
    #[serde(default)]
    pub charge_transfer: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hole: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electron: Option<Vec<Vec<f64>>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct QmResultRecord {
    pub total_energy: f64,
    #[serde(default)]
    pub self_energy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis: Option<BasisRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<Vec<Vec<f64>>>,
    #[serde(default, rename = "atom")]
    pub atoms: Vec<SiteRecord>,
    #[serde(default, rename = "excited")]
    pub excited_states: Vec<ExcitedStateRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InductorInput {
    #[serde(rename = "segment")]
    pub segments: Vec<SegmentRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ClassicalEnergyRecord {
    #[serde(default)]
    pub f00: f64,
    #[serde(default)]
    pub f01: f64,
    #[serde(default)]
    pub f02: f64,
    #[serde(default)]
    pub f11: f64,
    #[serde(default)]
    pub f12: f64,
    #[serde(default)]
    pub m0: f64,
    #[serde(default)]
    pub m1: f64,
    #[serde(default)]
    pub m2: f64,
    #[serde(default)]
    pub field_total: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InductorResult {
    pub converged: bool,
    #[serde(default)]
    pub energies: ClassicalEnergyRecord,
    /// Updated classical segments; segments not listed keep their multipoles.
    #[serde(default, rename = "segment")]
    pub segments: Vec<SegmentRecord>,
}

pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ExchangeError> {
    let content = fs::read_to_string(path).map_err(|source| ExchangeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ExchangeError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ExchangeError> {
    let content = toml::to_string(value).map_err(|source| ExchangeError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|source| ExchangeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds a dense matrix from row vectors. All rows must have the same length.
pub fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<DMatrix<f64>, String> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
        return Err(format!(
            "row {} has {} columns, expected {}",
            i,
            row.len(),
            ncols
        ));
    }
    Ok(DMatrix::from_row_iterator(
        rows.len(),
        ncols,
        rows.iter().flatten().copied(),
    ))
}

pub fn matrix_to_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}
