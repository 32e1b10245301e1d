use crate::core::io::exchange::{
    BasisRecord, ExcitedStateRecord, QmResultRecord, SiteRecord, matrix_to_rows,
};
use crate::engine::collaborators::{
    ArchiveWriter, CollaboratorError, ExcitedManifold, QmResult, SnapshotId,
};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

pub const ARCHIVE_FILE: &str = "system.orb";

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Snapshot {
    job_id: u64,
    iteration: usize,
    result: QmResultRecord,
}

/// Writes one snapshot per iteration into the iteration's run directory.
///
/// Snapshots are never overwritten; an existing file is reported as an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileArchiveWriter;

impl FileArchiveWriter {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveWriter for FileArchiveWriter {
    fn save(
        &self,
        id: &SnapshotId,
        result: &QmResult,
        excited: Option<&ExcitedManifold>,
    ) -> Result<(), CollaboratorError> {
        let path = id.run_dir.join(ARCHIVE_FILE);
        let snapshot = Snapshot {
            job_id: id.job_id,
            iteration: id.iteration,
            result: QmResultRecord {
                total_energy: result.total_energy,
                self_energy: result.self_energy,
                basis: result.basis.as_ref().map(|b| BasisRecord {
                    name: b.name.clone(),
                    ecp: b.uses_ecp,
                }),
                density: result.ground_state_density.as_ref().map(matrix_to_rows),
                atoms: result
                    .atoms
                    .iter()
                    .map(|a| SiteRecord {
                        element: a.element.clone(),
                        position: [a.position.x, a.position.y, a.position.z],
                        charge: a.charge,
                        dipole: [0.0; 3],
                    })
                    .collect(),
                excited_states: excited.map(excited_records).unwrap_or_default(),
            },
        };
        let content = toml::to_string(&snapshot).map_err(|e| CollaboratorError::Exchange {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CollaboratorError::io(&path, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| CollaboratorError::io(&path, e))?;
        debug!(path = %path.display(), "Archived iteration snapshot.");
        Ok(())
    }
}

fn excited_records(manifold: &ExcitedManifold) -> Vec<ExcitedStateRecord> {
    let kind = manifold.kind.to_string();
    manifold
        .states
        .iter()
        .map(|state| ExcitedStateRecord {
            kind: kind.clone(),
            energy: state.energy,
            oscillator_strength: state.oscillator_strength,
            charge_transfer: state.charge_transfer,
            hole: None,
            electron: None,
        })
        .collect()
}
