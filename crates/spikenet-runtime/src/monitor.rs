//! State recording into fixed-size circular buffers

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array2, ArrayView2, ArrayViewMut1};

use crate::error::*;

/// State variables that layers and connections can expose to monitors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StateVariable {
    /// Spikes as 0/1
    Spikes,
    /// Exponential spike traces
    Trace,
    /// LIF membrane potentials
    Voltage,
    /// LIF refractory countdowns
    Refractory,
    /// Connection weights, flattened row-major (source-major)
    Weights,
    /// Connection eligibility traces, flattened row-major
    Eligibility,
}

impl StateVariable {
    /// Short lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spikes => "spikes",
            Self::Trace => "trace",
            Self::Voltage => "voltage",
            Self::Refractory => "refractory",
            Self::Weights => "weights",
            Self::Eligibility => "eligibility",
        }
    }
}

impl fmt::Display for StateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability of exposing typed state to a monitor
pub trait Monitorable {
    /// Number of values recorded per timestep for `variable`, `None` if not exposed
    fn width(&self, variable: StateVariable) -> Option<usize>;

    /// Copy the current value of `variable` into `out`
    ///
    /// `out` always has the length reported by [`Monitorable::width`].
    fn read_into(&self, variable: StateVariable, out: ArrayViewMut1<'_, f32>);
}

/// What a monitor is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MonitorTarget {
    /// A layer, by name
    Layer(String),
    /// A connection, by its (source, target) layer names
    Connection {
        /// Source layer name
        source: String,
        /// Target layer name
        target: String,
    },
}

impl fmt::Display for MonitorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Layer(name) => write!(f, "{}", name),
            Self::Connection { source, target } => write!(f, "{}->{}", source, target),
        }
    }
}

/// Records state variables of one layer or connection
///
/// Each variable owns a `(capacity, width)` buffer; `record(t)` writes row
/// `t % capacity`. Buffers are allocated when the monitor is attached to a
/// network, since only then is the width known.
#[derive(Debug, Clone)]
pub struct Monitor {
    target: MonitorTarget,
    variables: Vec<StateVariable>,
    capacity: usize,
    buffers: BTreeMap<StateVariable, Array2<f32>>,
    recorded: usize,
}

impl Monitor {
    /// Create a monitor over `variables` of `target` with `capacity` slots
    pub fn new(
        target: MonitorTarget,
        variables: impl IntoIterator<Item = StateVariable>,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(RuntimeError::invalid_parameter("capacity", "0", "> 0"));
        }

        let mut variables: Vec<StateVariable> = variables.into_iter().collect();
        variables.sort();
        variables.dedup();
        if variables.is_empty() {
            return Err(RuntimeError::invalid_parameter(
                "variables",
                "[]",
                "at least one state variable",
            ));
        }

        Ok(Self {
            target,
            variables,
            capacity,
            buffers: BTreeMap::new(),
            recorded: 0,
        })
    }

    /// Monitor a layer
    pub fn layer(
        name: impl Into<String>,
        variables: impl IntoIterator<Item = StateVariable>,
        capacity: usize,
    ) -> Result<Self> {
        Self::new(MonitorTarget::Layer(name.into()), variables, capacity)
    }

    /// Monitor the connection between two layers
    pub fn connection(
        source: impl Into<String>,
        target: impl Into<String>,
        variables: impl IntoIterator<Item = StateVariable>,
        capacity: usize,
    ) -> Result<Self> {
        let target = MonitorTarget::Connection {
            source: source.into(),
            target: target.into(),
        };
        Self::new(target, variables, capacity)
    }

    /// Allocate buffers sized for `source`
    pub(crate) fn bind(&mut self, source: &dyn Monitorable) -> Result<()> {
        let mut buffers = BTreeMap::new();
        for &variable in &self.variables {
            let width = source.width(variable).ok_or_else(|| {
                RuntimeError::unknown("state variable", format!("{} of {}", variable, self.target))
            })?;
            buffers.insert(variable, Array2::zeros((self.capacity, width)));
        }
        self.buffers = buffers;
        self.recorded = 0;
        Ok(())
    }

    /// Write the current state of `source` into slot `timestep % capacity`
    pub fn record(&mut self, timestep: usize, source: &dyn Monitorable) {
        let slot = timestep % self.capacity;
        for (&variable, buffer) in self.buffers.iter_mut() {
            source.read_into(variable, buffer.row_mut(slot));
        }
        self.recorded += 1;
    }

    /// Full `(capacity, width)` buffer of `variable`, in slot order
    pub fn get(&self, variable: StateVariable) -> Result<ArrayView2<'_, f32>> {
        self.buffers
            .get(&variable)
            .map(|buffer| buffer.view())
            .ok_or_else(|| RuntimeError::unknown("monitored variable", variable.as_str()))
    }

    /// Zero every buffer; the monitored source is left untouched
    pub fn reset(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.fill(0.0);
        }
        self.recorded = 0;
    }

    /// Monitored entity
    pub fn target(&self) -> &MonitorTarget {
        &self.target
    }

    /// Monitored variables, sorted
    pub fn variables(&self) -> &[StateVariable] {
        &self.variables
    }

    /// Number of slots per buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records taken since creation or the last reset
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Whether buffers have been allocated by attaching to a network
    pub fn is_bound(&self) -> bool {
        !self.buffers.is_empty()
    }
}
