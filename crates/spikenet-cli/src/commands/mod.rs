//! CLI command implementations for spikenet

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::CliResult;

pub mod freq_match;
pub mod init;

/// spikenet - discrete-time spiking neural network experiments
#[derive(Parser, Debug)]
#[command(
    name = "spikenet",
    version,
    about = "Discrete-time spiking neural network experiments",
    long_about = "Runs spiking neural network experiments on the spikenet engine: \
                  Bernoulli-encoded inputs, LIF populations and reward-modulated \
                  STDP with eligibility traces."
)]
pub struct SpikenetCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SPIKENET_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default experiment configuration
    Init(init::InitCommand),

    /// Train output neurons to match random target firing rates
    #[command(alias = "freq")]
    FreqMatch(freq_match::FreqMatchCommand),
}

impl SpikenetCli {
    /// Execute the CLI command
    pub async fn execute(self) -> CliResult<()> {
        let workspace = match self.workspace {
            Some(workspace) => workspace,
            None => std::env::current_dir()?,
        };
        let config = self.config;

        match self.command {
            Commands::Init(cmd) => cmd.execute(workspace, config).await,
            Commands::FreqMatch(cmd) => cmd.execute(workspace, config).await,
        }
    }
}
