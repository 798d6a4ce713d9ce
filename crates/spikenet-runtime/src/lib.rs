//! Discrete-time spiking neural network engine
//!
//! Populations of input and leaky integrate-and-fire nodes are wired by dense
//! connections into a [`Network`] that is advanced one timestep at a time.
//! Connections learn with a reward-modulated STDP rule driven by an
//! eligibility trace ([`MstdpEt`]); [`Monitor`]s record state into circular
//! buffers, and a [`BernoulliEncoder`] turns rate vectors into spike trains.
//!
//! ```
//! use std::collections::HashMap;
//! use ndarray::Array2;
//! use spikenet_runtime::*;
//!
//! # fn main() -> Result<()> {
//! let mut network = Network::default();
//! network.add_layer("X", Layer::input(4)?)?;
//! network.add_layer("Y", Layer::lif(4)?)?;
//! let connection = Connection::uniform(4, 4, 0.5, ConnectionParams::default())?
//!     .with_rule(MstdpEt::default());
//! network.add_connection("X", "Y", connection)?;
//! network.add_monitor("Y", Monitor::layer("Y", [StateVariable::Spikes], 10)?)?;
//!
//! let mut inputs = HashMap::new();
//! inputs.insert("X".to_string(), Array2::from_elem((10, 4), true));
//! let summary = network.run(&inputs, 10, &LearningContext::default())?;
//! assert_eq!(summary.steps, 10);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod connection;
pub mod encoding;
pub mod error;
pub mod monitor;
pub mod network;
pub mod neuron;
pub mod plasticity;
pub mod simulation;

// Re-export essential types
pub use connection::{Connection, ConnectionParams};
pub use encoding::{BernoulliEncoder, BernoulliLoader};
pub use error::{Result, RuntimeError};
pub use monitor::{Monitor, MonitorTarget, Monitorable, StateVariable};
pub use network::{Inputs, Network, NetworkConfig, Phase};
pub use neuron::{InputNodes, InputParams, Layer, LayerKind, LifNodes, LifParams};
pub use plasticity::{LearningContext, LearningRule, MstdpEt, MstdpEtParams, Reward, SynapsesMut};
pub use simulation::{CancelToken, RunSummary, SimulationContext};
