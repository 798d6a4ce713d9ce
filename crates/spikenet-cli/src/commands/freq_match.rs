//! Frequency-matching training command

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::error::{CliError, CliResult};
use crate::experiment::{FreqMatch, FreqMatchReport};

/// Train output neurons to fire at random target rates
#[derive(Args, Debug)]
pub struct FreqMatchCommand {
    /// Units per layer
    #[arg(short = 'n', long)]
    pub neurons: Option<usize>,

    /// Training iterations
    #[arg(short = 'i', long)]
    pub iterations: Option<usize>,

    /// Iterations between plot snapshots
    #[arg(long)]
    pub plot_interval: Option<usize>,

    /// Iterations between reward log lines
    #[arg(long)]
    pub print_interval: Option<usize>,

    /// Stream plot snapshots as JSON lines to --plot-file
    #[arg(long)]
    pub plot: bool,

    /// Snapshot file for --plot, relative to the workspace
    #[arg(long, default_value = "freq_match_plot.jsonl")]
    pub plot_file: PathBuf,

    /// Request accelerated execution (accepted for compatibility, ignored)
    #[arg(long)]
    pub gpu: bool,

    /// Random seed for reproducibility
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write a JSON summary to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl FreqMatchCommand {
    pub async fn execute(self, workspace: PathBuf, config: Option<PathBuf>) -> CliResult<()> {
        let mut experiment_config = match config {
            Some(path) => {
                let path = workspace.join(path);
                info!("Loading configuration from {}", path.display());
                ExperimentConfig::load_from_file(&path)?
            }
            None => ExperimentConfig::default(),
        };
        self.apply_overrides(&mut experiment_config);
        experiment_config.validate()?;

        if self.gpu {
            warn!("--gpu has no effect: the engine runs on the host");
        }

        info!(
            "Starting frequency matching: n={}, iterations={}, seed={}",
            experiment_config.n, experiment_config.iterations, experiment_config.seed
        );

        let experiment = FreqMatch::new(experiment_config)?;
        let cancel = experiment.cancel_token();
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current iteration");
                cancel.cancel();
            }
        });

        let plot_path = self.plot.then(|| workspace.join(&self.plot_file));
        let show_progress = !self.no_progress;
        let report = tokio::task::spawn_blocking(move || run_with_progress(experiment, plot_path, show_progress))
            .await
            .map_err(|e| CliError::Generic(anyhow::anyhow!("experiment task failed: {}", e)))??;
        signal.abort();

        info!(
            "Completed {}/{} iterations: final reward {:.6}, mean |reward| {:.6}, rate error {:.6}, mean weight {:.4}",
            report.completed,
            report.iterations,
            report.final_reward,
            report.mean_abs_reward,
            report.rate_error,
            report.mean_weight
        );

        if let Some(output) = self.output {
            let output_path = workspace.join(output);
            info!("Saving results to: {}", output_path.display());
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&output_path, serde_json::to_string_pretty(&report)?)?;
        }

        Ok(())
    }

    fn apply_overrides(&self, config: &mut ExperimentConfig) {
        if let Some(n) = self.neurons {
            config.n = n;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
        if let Some(plot_interval) = self.plot_interval {
            config.plot_interval = plot_interval;
        }
        if let Some(print_interval) = self.print_interval {
            config.print_interval = print_interval;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

fn run_with_progress(
    mut experiment: FreqMatch,
    plot_path: Option<PathBuf>,
    show_progress: bool,
) -> CliResult<FreqMatchReport> {
    let total = experiment.report().iterations as u64;
    let progress = if show_progress {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .map_err(anyhow::Error::from)?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut plot_writer = match plot_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            info!("Writing plot snapshots to {}", path.display());
            Some(BufWriter::new(File::create(path)?))
        }
        None => None,
    };

    let report = experiment.run(
        plot_writer.as_mut().map(|writer| writer as &mut dyn Write),
        |i| progress.set_position(i as u64),
    )?;
    if let Some(mut writer) = plot_writer {
        writer.flush()?;
    }
    progress.finish_and_clear();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::commands::{Commands, SpikenetCli};

    #[test]
    fn test_overrides_applied() {
        let cli = SpikenetCli::parse_from(["spikenet", "freq-match", "-n", "9", "-i", "30", "--seed", "5"]);
        let Commands::FreqMatch(cmd) = cli.command else {
            panic!("expected freq-match");
        };

        let mut config = ExperimentConfig::default();
        cmd.apply_overrides(&mut config);
        assert_eq!(config.n, 9);
        assert_eq!(config.iterations, 30);
        assert_eq!(config.seed, 5);
        assert_eq!(config.plot_interval, 500);
    }

    #[test]
    fn test_run_with_plot_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            n: 4,
            iterations: 6,
            plot_interval: 3,
            ..Default::default()
        };
        let experiment = FreqMatch::new(config).unwrap();
        let path = dir.path().join("plots").join("snap.jsonl");

        let report = run_with_progress(experiment, Some(path.clone()), false).unwrap();
        assert_eq!(report.completed, 6);
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
