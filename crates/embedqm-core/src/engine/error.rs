use std::path::PathBuf;
use thiserror::Error;

use super::config::ConfigError;
use crate::core::models::atom::ElementError;

/// Coarse classification of a failed job, reported in summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Configuration,
    ClassicalNonConvergence,
    SolverRunFailure,
    ParseFailure,
    ExcitedStateUnavailable,
    ChargeProjection,
    Archive,
    Io,
    Internal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::Configuration => "configuration",
            FailureKind::ClassicalNonConvergence => "classical-non-convergence",
            FailureKind::SolverRunFailure => "solver-run-failure",
            FailureKind::ParseFailure => "parse-failure",
            FailureKind::ExcitedStateUnavailable => "excited-state-unavailable",
            FailureKind::ChargeProjection => "charge-projection",
            FailureKind::Archive => "archive",
            FailureKind::Io => "io",
            FailureKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {source}")]
    Configuration {
        #[from]
        source: ConfigError,
    },

    #[error("Invalid QM core: {source}")]
    Element {
        #[from]
        source: ElementError,
    },

    #[error("Classical induction did not converge in iteration {iteration}: {detail}")]
    ClassicalNonConvergence { iteration: usize, detail: String },

    #[error("QM engine run failed in iteration {iteration}: {reason}")]
    SolverRunFailure { iteration: usize, reason: String },

    #[error("Could not read QM result of iteration {iteration}: {reason}")]
    ParseFailure { iteration: usize, reason: String },

    #[error(
        "Excited state {requested} requested in iteration {iteration}, but only {available} passed the filters"
    )]
    ExcitedStateUnavailable {
        iteration: usize,
        requested: usize,
        available: usize,
    },

    #[error("Charge projection failed in iteration {iteration}: {reason}")]
    ChargeProjection { iteration: usize, reason: String },

    #[error("Failed to archive iteration {iteration}: {reason}")]
    Archive { iteration: usize, reason: String },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EngineError::Configuration { .. } | EngineError::Element { .. } => {
                FailureKind::Configuration
            }
            EngineError::ClassicalNonConvergence { .. } => FailureKind::ClassicalNonConvergence,
            EngineError::SolverRunFailure { .. } => FailureKind::SolverRunFailure,
            EngineError::ParseFailure { .. } => FailureKind::ParseFailure,
            EngineError::ExcitedStateUnavailable { .. } => FailureKind::ExcitedStateUnavailable,
            EngineError::ChargeProjection { .. } => FailureKind::ChargeProjection,
            EngineError::Archive { .. } => FailureKind::Archive,
            EngineError::Io { .. } => FailureKind::Io,
            EngineError::Internal(_) => FailureKind::Internal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}
