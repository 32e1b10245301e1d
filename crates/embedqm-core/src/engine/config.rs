use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_MAX_POSITION_RMS: f64 = 0.01;
pub const DEFAULT_MAX_CHARGE_RMS: f64 = 0.01;
pub const DEFAULT_MAX_QM_ENERGY_CHANGE: f64 = 0.001;
pub const DEFAULT_MAX_ITERATIONS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

/// Whether the classical environment responds to the QM charge distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouplingMode {
    /// A single QM solve in a fixed classical background.
    #[default]
    Static,
    /// Iterate classical induction and QM solves until self-consistent.
    Polarizable,
}

impl CouplingMode {
    pub fn is_polarizable(self) -> bool {
        matches!(self, CouplingMode::Polarizable)
    }
}

impl FromStr for CouplingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(CouplingMode::Static),
            "polarizable" | "polarized" => Ok(CouplingMode::Polarizable),
            other => Err(ConfigError::InvalidValue {
                parameter: "mode",
                reason: format!("expected 'static' or 'polarizable', got '{other}'"),
            }),
        }
    }
}

/// Thresholds of the outer self-consistency loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceCriteria {
    /// Maximum RMS displacement of the QM core sites, in Angstroms.
    pub max_position_rms: f64,
    /// Maximum RMS charge change of the QM core sites, in e.
    pub max_charge_rms: f64,
    /// Maximum change of the QM electronic energy between iterations.
    pub max_qm_energy_change: f64,
    /// Maximum change of the classical energy between iterations.
    pub max_mm_energy_change: f64,
    /// Upper bound on the number of outer iterations.
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_position_rms: DEFAULT_MAX_POSITION_RMS,
            max_charge_rms: DEFAULT_MAX_CHARGE_RMS,
            max_qm_energy_change: DEFAULT_MAX_QM_ENERGY_CHANGE,
            max_mm_energy_change: DEFAULT_MAX_QM_ENERGY_CHANGE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Spin manifold of the requested excited state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcitationKind {
    Singlet,
    Triplet,
}

impl FromStr for ExcitationKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "singlet" => Ok(ExcitationKind::Singlet),
            "triplet" => Ok(ExcitationKind::Triplet),
            other => Err(ConfigError::InvalidValue {
                parameter: "excited-state.type",
                reason: format!("invalid excited state type '{other}'"),
            }),
        }
    }
}

impl fmt::Display for ExcitationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExcitationKind::Singlet => write!(f, "singlet"),
            ExcitationKind::Triplet => write!(f, "triplet"),
        }
    }
}

/// Which excited state to follow and how to pick it among the computed ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExcitedStateConfig {
    /// 1-based position in the filtered list; `0` keeps the ground state.
    pub state: usize,
    pub kind: ExcitationKind,
    pub oscillator_strength_threshold: Option<f64>,
    pub charge_transfer_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub convergence: ConvergenceCriteria,
    pub mode: CouplingMode,
    /// Directory under which each job creates its own working directory.
    pub work_dir: PathBuf,
    /// Persist a snapshot of the QM result after every iteration.
    pub archive_iterations: bool,
    pub excited_state: Option<ExcitedStateConfig>,
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    max_position_rms: Option<f64>,
    max_charge_rms: Option<f64>,
    max_qm_energy_change: Option<f64>,
    max_mm_energy_change: Option<f64>,
    max_iterations: Option<usize>,
    mode: Option<CouplingMode>,
    work_dir: Option<PathBuf>,
    archive_iterations: bool,
    excited_state: Option<ExcitedStateConfig>,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_position_rms(mut self, threshold: f64) -> Self {
        self.max_position_rms = Some(threshold);
        self
    }
    pub fn max_charge_rms(mut self, threshold: f64) -> Self {
        self.max_charge_rms = Some(threshold);
        self
    }
    pub fn max_qm_energy_change(mut self, threshold: f64) -> Self {
        self.max_qm_energy_change = Some(threshold);
        self
    }
    pub fn max_mm_energy_change(mut self, threshold: f64) -> Self {
        self.max_mm_energy_change = Some(threshold);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn mode(mut self, mode: CouplingMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn work_dir(mut self, path: PathBuf) -> Self {
        self.work_dir = Some(path);
        self
    }
    pub fn archive_iterations(mut self, enabled: bool) -> Self {
        self.archive_iterations = enabled;
        self
    }
    pub fn excited_state(mut self, excited_state: ExcitedStateConfig) -> Self {
        self.excited_state = Some(excited_state);
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let max_qm_energy_change = self
            .max_qm_energy_change
            .unwrap_or(DEFAULT_MAX_QM_ENERGY_CHANGE);
        let convergence = ConvergenceCriteria {
            max_position_rms: non_negative(
                "max-position-rms",
                self.max_position_rms.unwrap_or(DEFAULT_MAX_POSITION_RMS),
            )?,
            max_charge_rms: non_negative(
                "max-charge-rms",
                self.max_charge_rms.unwrap_or(DEFAULT_MAX_CHARGE_RMS),
            )?,
            max_qm_energy_change: non_negative("max-qm-energy-change", max_qm_energy_change)?,
            max_mm_energy_change: non_negative(
                "max-mm-energy-change",
                self.max_mm_energy_change.unwrap_or(max_qm_energy_change),
            )?,
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
        };
        if convergence.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "max-iterations",
                reason: "at least one iteration is required".to_string(),
            });
        }

        let excited_state = self.excited_state.map(validate_excited_state).transpose()?;

        Ok(EngineConfig {
            convergence,
            mode: self.mode.unwrap_or_default(),
            work_dir: self
                .work_dir
                .ok_or(ConfigError::MissingParameter("work_dir"))?,
            archive_iterations: self.archive_iterations,
            excited_state,
        })
    }
}

fn non_negative(parameter: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            reason: format!("must be a finite, non-negative number (got {value})"),
        })
    }
}

fn validate_excited_state(
    mut config: ExcitedStateConfig,
) -> Result<ExcitedStateConfig, ConfigError> {
    if let Some(threshold) = config.charge_transfer_threshold {
        non_negative("excited-state.charge-transfer", threshold)?;
    }
    if let Some(threshold) = config.oscillator_strength_threshold {
        non_negative("excited-state.oscillator-strength", threshold)?;
        if config.kind == ExcitationKind::Triplet {
            warn!("Oscillator strength filter ignored for triplet excitations.");
            config.oscillator_strength_threshold = None;
        }
    }
    Ok(config)
}
