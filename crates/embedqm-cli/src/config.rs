use crate::cli::ConfigArgs;
use crate::error::{CliError, Result};
use embedqm::backends::external::ExternalProgram;
use embedqm::backends::factory::{BackendSpec, InductorSpec, QmEngineSpec};
use embedqm::engine::config::{
    CouplingMode, EngineConfig, EngineConfigBuilder, ExcitationKind, ExcitedStateConfig,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialEngineConfig {
    mode: Option<String>,
    #[serde(rename = "work-dir")]
    work_dir: Option<PathBuf>,
    archive: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialConvergenceConfig {
    #[serde(rename = "max-position-rms")]
    max_position_rms: Option<f64>,
    #[serde(rename = "max-charge-rms")]
    max_charge_rms: Option<f64>,
    #[serde(rename = "max-qm-energy-change")]
    max_qm_energy_change: Option<f64>,
    #[serde(rename = "max-mm-energy-change")]
    max_mm_energy_change: Option<f64>,
    #[serde(rename = "max-iterations")]
    max_iterations: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialExcitedStateConfig {
    state: Option<usize>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "oscillator-strength")]
    oscillator_strength: Option<f64>,
    #[serde(rename = "charge-transfer")]
    charge_transfer: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", rename_all_fields = "kebab-case", tag = "type")]
enum PartialQmEngine {
    External {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
    Replay {
        source_dir: PathBuf,
    },
}

impl From<PartialQmEngine> for QmEngineSpec {
    fn from(p: PartialQmEngine) -> Self {
        match p {
            PartialQmEngine::External { program, args } => {
                QmEngineSpec::External(ExternalProgram::new(program, args))
            }
            PartialQmEngine::Replay { source_dir } => QmEngineSpec::Replay { source_dir },
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "type")]
enum PartialInductor {
    External {
        program: PathBuf,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl From<PartialInductor> for InductorSpec {
    fn from(p: PartialInductor) -> Self {
        match p {
            PartialInductor::External { program, args } => {
                InductorSpec::External(ExternalProgram::new(program, args))
            }
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialAppConfig {
    engine: Option<PartialEngineConfig>,
    convergence: Option<PartialConvergenceConfig>,
    #[serde(rename = "excited-state")]
    excited_state: Option<PartialExcitedStateConfig>,
    #[serde(rename = "qm-engine")]
    qm_engine: Option<PartialQmEngine>,
    inductor: Option<PartialInductor>,
}

/// Fully resolved configuration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub backends: BackendSpec,
}

impl PartialAppConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Loads the config file named in `args`, if any, and merges the CLI overrides into it.
    pub fn load(args: &ConfigArgs) -> Result<AppConfig> {
        let partial = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        partial.merge_with_cli(args)
    }

    pub fn merge_with_cli(mut self, args: &ConfigArgs) -> Result<AppConfig> {
        self.apply_set_values(&args.set_values)?;

        let engine = self.engine.take().unwrap_or_default();
        let convergence = self.convergence.take().unwrap_or_default();

        let mode = if args.mode.static_mode {
            CouplingMode::Static
        } else if args.mode.polarizable {
            CouplingMode::Polarizable
        } else {
            match engine.mode.as_deref() {
                Some(s) => s.parse().map_err(config_error)?,
                None => CouplingMode::default(),
            }
        };

        let mut builder = EngineConfigBuilder::new()
            .mode(mode)
            .work_dir(
                args.work_dir
                    .clone()
                    .or(engine.work_dir)
                    .unwrap_or_else(|| PathBuf::from(".")),
            )
            .archive_iterations(args.archive || engine.archive.unwrap_or(false));

        if let Some(v) = args.max_iterations.or(convergence.max_iterations) {
            builder = builder.max_iterations(v);
        }
        if let Some(v) = convergence.max_position_rms {
            builder = builder.max_position_rms(v);
        }
        if let Some(v) = convergence.max_charge_rms {
            builder = builder.max_charge_rms(v);
        }
        if let Some(v) = convergence.max_qm_energy_change {
            builder = builder.max_qm_energy_change(v);
        }
        if let Some(v) = convergence.max_mm_energy_change {
            builder = builder.max_mm_energy_change(v);
        }
        if let Some(es) = self.excited_state.take() {
            builder = builder.excited_state(Self::merge_excited_state(es)?);
        }

        let engine_config = builder.build().map_err(config_error)?;

        let qm_engine = self
            .qm_engine
            .take()
            .ok_or_else(|| CliError::Config("`qm-engine` section is required.".to_string()))?;
        let inductor = self.inductor.take().map(InductorSpec::from);
        if engine_config.mode.is_polarizable() && inductor.is_none() {
            return Err(CliError::Config(
                "`inductor` section is required in polarizable mode.".to_string(),
            ));
        }

        Ok(AppConfig {
            engine: engine_config,
            backends: BackendSpec {
                qm_engine: qm_engine.into(),
                inductor,
            },
        })
    }

    fn merge_excited_state(p: PartialExcitedStateConfig) -> Result<ExcitedStateConfig> {
        let kind: ExcitationKind = match p.kind.as_deref() {
            Some(s) => s.parse().map_err(config_error)?,
            None => ExcitationKind::Singlet,
        };
        Ok(ExcitedStateConfig {
            state: p.state.unwrap_or(0),
            kind,
            oscillator_strength_threshold: p.oscillator_strength,
            charge_transfer_threshold: p.charge_transfer,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                ))
            })?;

            let float = || -> Result<f64> {
                value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid float value for {}: {}", key, value_str))
                })
            };
            let integer = || -> Result<usize> {
                value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid integer value for {}: {}", key, value_str))
                })
            };

            let engine = || PartialEngineConfig::default();
            match key {
                "engine.mode" => {
                    self.engine.get_or_insert_with(engine).mode = Some(value_str.to_string());
                }
                "engine.work-dir" => {
                    self.engine.get_or_insert_with(engine).work_dir = Some(value_str.into());
                }
                "engine.archive" => {
                    self.engine.get_or_insert_with(engine).archive =
                        Some(value_str.parse().map_err(|_| {
                            CliError::Config(format!(
                                "Invalid boolean value for {}: {}",
                                key, value_str
                            ))
                        })?);
                }
                "convergence.max-position-rms" => {
                    self.convergence
                        .get_or_insert_with(Default::default)
                        .max_position_rms = Some(float()?);
                }
                "convergence.max-charge-rms" => {
                    self.convergence
                        .get_or_insert_with(Default::default)
                        .max_charge_rms = Some(float()?);
                }
                "convergence.max-qm-energy-change" => {
                    self.convergence
                        .get_or_insert_with(Default::default)
                        .max_qm_energy_change = Some(float()?);
                }
                "convergence.max-mm-energy-change" => {
                    self.convergence
                        .get_or_insert_with(Default::default)
                        .max_mm_energy_change = Some(float()?);
                }
                "convergence.max-iterations" => {
                    self.convergence
                        .get_or_insert_with(Default::default)
                        .max_iterations = Some(integer()?);
                }
                "excited-state.state" => {
                    self.excited_state.get_or_insert_with(Default::default).state =
                        Some(integer()?);
                }
                "excited-state.type" => {
                    self.excited_state.get_or_insert_with(Default::default).kind =
                        Some(value_str.to_string());
                }
                "excited-state.oscillator-strength" => {
                    self.excited_state
                        .get_or_insert_with(Default::default)
                        .oscillator_strength = Some(float()?);
                }
                "excited-state.charge-transfer" => {
                    self.excited_state
                        .get_or_insert_with(Default::default)
                        .charge_transfer = Some(float()?);
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn config_error(e: impl std::fmt::Display) -> CliError {
    CliError::Config(e.to_string())
}
