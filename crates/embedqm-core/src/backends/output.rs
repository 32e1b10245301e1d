use crate::core::io::exchange::{QmResultRecord, matrix_from_rows, read_toml};
use crate::core::models::atom::QmAtom;
use crate::engine::collaborators::{
    BasisDescription, CollaboratorError, ExcitedStateCandidate, QmResult, TransitionDensity,
};
use crate::engine::config::ExcitationKind;
use nalgebra::{DMatrix, Point3};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct ParsedExcitedState {
    kind: ExcitationKind,
    candidate: ExcitedStateCandidate,
    hole: Option<DMatrix<f64>>,
    electron: Option<DMatrix<f64>>,
}

/// A QM result file, converted into engine values.
#[derive(Debug, Clone)]
pub(crate) struct QmOutput {
    path: PathBuf,
    result: QmResult,
    excited: Vec<ParsedExcitedState>,
}

impl QmOutput {
    pub(crate) fn read(path: &Path) -> Result<Self, CollaboratorError> {
        let record: QmResultRecord = read_toml(path).map_err(|e| CollaboratorError::Exchange {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_record(path, record)
    }

    fn from_record(path: &Path, record: QmResultRecord) -> Result<Self, CollaboratorError> {
        let invalid = |reason: String| CollaboratorError::Exchange {
            path: path.to_path_buf(),
            reason,
        };

        let atoms = record
            .atoms
            .into_iter()
            .map(|a| {
                let [x, y, z] = a.position;
                QmAtom::new(&a.element, Point3::new(x, y, z), a.charge)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;

        let ground_state_density = record
            .density
            .as_deref()
            .map(matrix_from_rows)
            .transpose()
            .map_err(|e| invalid(format!("density: {e}")))?;

        let mut excited = Vec::with_capacity(record.excited_states.len());
        let mut per_kind = [0usize; 2];
        for state in record.excited_states {
            let kind: ExcitationKind = state.kind.parse().map_err(|e| invalid(format!("{e}")))?;
            let slot = &mut per_kind[kind as usize];
            let density = |rows: Option<Vec<Vec<f64>>>, label: &str| {
                rows.as_deref()
                    .map(matrix_from_rows)
                    .transpose()
                    .map_err(|e| invalid(format!("{} {} {}: {}", kind, *slot, label, e)))
            };
            let hole = density(state.hole, "hole")?;
            let electron = density(state.electron, "electron")?;
            excited.push(ParsedExcitedState {
                kind,
                candidate: ExcitedStateCandidate {
                    index: *slot,
                    oscillator_strength: state.oscillator_strength,
                    charge_transfer: state.charge_transfer,
                    energy: state.energy,
                },
                hole,
                electron,
            });
            *slot += 1;
        }

        Ok(Self {
            path: path.to_path_buf(),
            result: QmResult {
                total_energy: record.total_energy,
                self_energy: record.self_energy,
                atoms,
                ground_state_density,
                basis: record.basis.map(|b| BasisDescription {
                    name: b.name,
                    uses_ecp: b.ecp,
                }),
            },
            excited,
        })
    }

    pub(crate) fn result(&self) -> &QmResult {
        &self.result
    }

    /// Excited states of one spin manifold, indexed from zero within that manifold.
    pub(crate) fn candidates(&self, kind: ExcitationKind) -> Vec<ExcitedStateCandidate> {
        self.excited
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.candidate)
            .collect()
    }

    pub(crate) fn density(
        &self,
        kind: ExcitationKind,
        index: usize,
    ) -> Result<TransitionDensity, CollaboratorError> {
        let missing = |what: &str| CollaboratorError::Exchange {
            path: self.path.clone(),
            reason: format!("{kind} state {index} has no {what} density"),
        };
        let state = self
            .excited
            .iter()
            .filter(|s| s.kind == kind)
            .nth(index)
            .ok_or_else(|| missing("computed"))?;
        Ok(TransitionDensity {
            hole: state.hole.clone().ok_or_else(|| missing("hole"))?,
            electron: state.electron.clone().ok_or_else(|| missing("electron"))?,
        })
    }
}
