//! spikenet CLI crate
//!
//! Library view of the `spikenet` binary, so commands and the experiment
//! driver can be exercised from tests without spawning a process.
//!
//! Commands (see [commands]):
//! - init: write the default experiment configuration as TOML.
//! - freq-match: train an input population to drive LIF outputs at random
//!   target rates with reward-modulated STDP, optionally streaming plot
//!   snapshots and writing a JSON summary.

pub mod commands;
pub mod config;
pub mod error;
pub mod experiment;

pub use commands::SpikenetCli;
