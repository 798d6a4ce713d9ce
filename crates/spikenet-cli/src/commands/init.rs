//! Configuration initialization command

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::config::{ExperimentConfig, DEFAULT_CONFIG_FILE};
use crate::error::{CliError, CliResult};

/// Write the default experiment configuration
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Output file, relative to the workspace
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,

    /// Seed recorded in the generated configuration
    #[arg(long)]
    pub seed: Option<u64>,
}

impl InitCommand {
    pub async fn execute(self, workspace: PathBuf, config: Option<PathBuf>) -> CliResult<()> {
        let path = workspace.join(config.unwrap_or(self.path));
        if path.exists() && !self.force {
            return Err(CliError::invalid_args(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        let mut experiment = ExperimentConfig::default();
        if let Some(seed) = self.seed {
            experiment.seed = seed;
        }
        experiment.save_to_file(&path)?;

        info!("Wrote default configuration to {}", path.display());
        info!("Run 'spikenet --config {} freq-match' to use it", path.display());
        Ok(())
    }
}
