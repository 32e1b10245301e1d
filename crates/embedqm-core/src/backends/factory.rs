use super::archive::FileArchiveWriter;
use super::external::{ExternalInductor, ExternalProgram, ExternalQmEngine};
use super::replay::ReplayQmEngine;
use crate::engine::collaborators::{Collaborators, QmEngine};
use crate::engine::config::{ConfigError, EngineConfig};
use crate::engine::context::{JobContext, job_dir_name};
use crate::engine::error::EngineError;
use std::path::PathBuf;

/// Builds a fresh set of collaborators for each job.
pub trait CollaboratorFactory: Sync {
    fn build(&self, job: &JobContext, config: &EngineConfig)
    -> Result<Collaborators, EngineError>;
}

impl<F> CollaboratorFactory for F
where
    F: Fn(&JobContext, &EngineConfig) -> Result<Collaborators, EngineError> + Sync,
{
    fn build(
        &self,
        job: &JobContext,
        config: &EngineConfig,
    ) -> Result<Collaborators, EngineError> {
        self(job, config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QmEngineSpec {
    External(ExternalProgram),
    /// Replays results recorded under `<source_dir>/xjob_<id>_<tag>/iter_<n>/`.
    Replay { source_dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InductorSpec {
    External(ExternalProgram),
}

/// Backend selection, as read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSpec {
    pub qm_engine: QmEngineSpec,
    pub inductor: Option<InductorSpec>,
}

impl CollaboratorFactory for BackendSpec {
    fn build(
        &self,
        job: &JobContext,
        config: &EngineConfig,
    ) -> Result<Collaborators, EngineError> {
        let qm_engine: Box<dyn QmEngine> = match &self.qm_engine {
            QmEngineSpec::External(program) => Box::new(ExternalQmEngine::new(program.clone())),
            QmEngineSpec::Replay { source_dir } => Box::new(ReplayQmEngine::new(
                source_dir.join(job_dir_name(job.id(), job.tag())),
            )),
        };
        let mut collaborators = Collaborators::new(qm_engine);

        if job.mode().is_polarizable() {
            match &self.inductor {
                Some(InductorSpec::External(program)) => {
                    collaborators =
                        collaborators.with_inductor(Box::new(ExternalInductor::new(program.clone())));
                }
                None => return Err(ConfigError::MissingParameter("inductor").into()),
            }
        }
        if config.archive_iterations {
            collaborators = collaborators.with_archive(Box::new(FileArchiveWriter::new()));
        }
        Ok(collaborators)
    }
}
