use super::output::QmOutput;
use crate::core::io::exchange::QM_RESULT_FILE;
use crate::core::models::atom::QmAtom;
use crate::core::models::site::PolarSite;
use crate::engine::collaborators::{
    CollaboratorError, ExcitedStateCandidate, QmEngine, QmResult, TransitionDensity,
};
use crate::engine::config::ExcitationKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// QM engine that replays results recorded by an earlier run.
///
/// The n-th run reads `<source>/iter_<n>/qm-result.toml`, so the orchestration
/// can be repeated without invoking the QM program.
pub struct ReplayQmEngine {
    source_dir: PathBuf,
    runs: usize,
    pending: Option<PathBuf>,
    output: Option<QmOutput>,
}

impl ReplayQmEngine {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            runs: 0,
            pending: None,
            output: None,
        }
    }

    fn output(&self) -> Result<&QmOutput, CollaboratorError> {
        self.output
            .as_ref()
            .ok_or_else(|| CollaboratorError::Message("no replayed QM result available".into()))
    }
}

impl QmEngine for ReplayQmEngine {
    fn name(&self) -> &str {
        "replay"
    }

    fn set_charge_and_multiplicity(&mut self, _charge: i32, _multiplicity: u32) {}

    fn prepare(
        &mut self,
        _run_dir: &Path,
        _core: &[QmAtom],
        _background: &[PolarSite],
    ) -> Result<(), CollaboratorError> {
        self.pending = None;
        self.output = None;
        Ok(())
    }

    fn run(&mut self) -> Result<(), CollaboratorError> {
        let path = self
            .source_dir
            .join(format!("iter_{}", self.runs))
            .join(QM_RESULT_FILE);
        self.runs += 1;
        if !path.is_file() {
            return Err(CollaboratorError::Message(format!(
                "no recorded result at '{}'",
                path.display()
            )));
        }
        debug!(path = %path.display(), "Replaying recorded QM result.");
        self.pending = Some(path);
        Ok(())
    }

    fn parse_result(&mut self) -> Result<QmResult, CollaboratorError> {
        let path = self
            .pending
            .take()
            .ok_or_else(|| CollaboratorError::Message("parse_result called before run".into()))?;
        let output = QmOutput::read(&path)?;
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
