//! Experiment configuration

use std::path::Path;

use serde::{Deserialize, Serialize};
use spikenet_runtime::{BernoulliEncoder, ConnectionParams, InputParams, LifParams, MstdpEtParams};

use crate::error::{CliError, CliResult};

/// Default config file name written by `spikenet init`
pub const DEFAULT_CONFIG_FILE: &str = "spikenet.toml";

/// Frequency-matching experiment configuration
///
/// Every section falls back to its defaults when omitted; unknown keys are
/// rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    /// Seed of every random draw in the experiment
    pub seed: u64,
    /// Units per layer
    pub n: usize,
    /// Training iterations
    pub iterations: usize,
    /// Iterations between plot snapshots (also the spike record window)
    pub plot_interval: usize,
    /// Iterations between reward log lines
    pub print_interval: usize,
    /// Initial weights are drawn from `init_scale * U(0, 1)`
    pub init_scale: f32,
    /// Input layer parameters
    pub input: InputParams,
    /// Output layer parameters
    pub lif: LifParams,
    /// Weight bounds and learning rate
    pub connection: ConnectionParams,
    /// Learning rule configuration
    pub learning: LearningConfig,
    /// Input encoder
    pub encoder: BernoulliEncoder,
    /// Target firing rates
    pub task: TaskConfig,
}

/// Learning rule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LearningConfig {
    /// Potentiation magnitude
    pub a_plus: f32,
    /// Depression magnitude
    pub a_minus: f32,
    /// MSTDPET rule parameters, the `[learning.rule]` table
    pub rule: MstdpEtParams,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            a_plus: 1.0,
            a_minus: 0.0,
            rule: MstdpEtParams::default(),
        }
    }
}

/// Target rates are drawn from `target_base + target_spread * U(0, 1)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskConfig {
    /// Lowest target rate
    pub target_base: f32,
    /// Width of the target rate range
    pub target_spread: f32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            target_base: 0.02,
            target_spread: 0.05,
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            n: 100,
            iterations: 100_000,
            plot_interval: 500,
            print_interval: 25,
            init_scale: 1.5,
            input: InputParams::default(),
            lif: LifParams::default(),
            connection: ConnectionParams {
                w_min: 0.0,
                w_max: 1.25,
                nu: 1.0,
            },
            learning: LearningConfig::default(),
            encoder: BernoulliEncoder {
                time: 1,
                max_prob: 0.05,
            },
            task: TaskConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML
    pub fn save_to_file(&self, path: &Path) -> CliResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every section
    pub fn validate(&self) -> CliResult<()> {
        for (name, value) in [
            ("n", self.n),
            ("iterations", self.iterations),
            ("plot_interval", self.plot_interval),
            ("print_interval", self.print_interval),
        ] {
            if value == 0 {
                return Err(CliError::config(format!("{} must be positive", name)));
            }
        }
        if !(self.init_scale > 0.0) || !self.init_scale.is_finite() {
            return Err(CliError::config(format!(
                "init_scale must be positive and finite, got {}",
                self.init_scale
            )));
        }
        if !(self.task.target_base >= 0.0 && self.task.target_spread >= 0.0) {
            return Err(CliError::config("target rates must be non-negative"));
        }

        self.input.validate()?;
        self.lif.validate()?;
        self.connection.validate()?;
        self.learning.rule.validate()?;
        self.encoder.validate()?;
        Ok(())
    }
}
