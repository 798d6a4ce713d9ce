//! Node populations: spike inputs and leaky integrate-and-fire neurons

use ndarray::{Array1, ArrayView1, ArrayViewMut1, Zip};

use crate::error::*;
use crate::monitor::{Monitorable, StateVariable};

/// Parameters for Input populations
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct InputParams {
    /// Multiplicative spike trace decay per timestep
    pub trace_decay: f32,
}

impl Default for InputParams {
    fn default() -> Self {
        Self { trace_decay: 0.95 }
    }
}

impl InputParams {
    /// Create new input parameters with validation
    pub fn new(trace_decay: f32) -> Result<Self> {
        validate_decay("trace_decay", trace_decay)?;
        Ok(Self { trace_decay })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.trace_decay)?;
        Ok(())
    }
}

/// Parameters for Leaky Integrate-and-Fire populations
///
/// Time is measured in timesteps, voltages in arbitrary units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct LifParams {
    /// Membrane time constant (timesteps)
    pub tau_rc: f32,
    /// Resting potential the membrane leaks towards
    pub v_rest: f32,
    /// Reset potential after a spike
    pub v_reset: f32,
    /// Threshold potential
    pub v_threshold: f32,
    /// Refractory period (timesteps)
    pub t_refractory: u32,
    /// Multiplicative spike trace decay per timestep
    pub trace_decay: f32,
}

impl Default for LifParams {
    fn default() -> Self {
        Self {
            tau_rc: 10.0,
            v_rest: 0.0,
            v_reset: 0.0,
            v_threshold: 1.0,
            t_refractory: 5,
            trace_decay: 0.95,
        }
    }
}

impl LifParams {
    /// Create new LIF parameters with validation
    pub fn new(
        tau_rc: f32,
        v_rest: f32,
        v_reset: f32,
        v_threshold: f32,
        t_refractory: u32,
        trace_decay: f32,
    ) -> Result<Self> {
        // tau_rc below one step would overshoot the input on every update
        if !(tau_rc >= 1.0) || !tau_rc.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "tau_rc",
                tau_rc.to_string(),
                ">= 1.0",
            ));
        }
        if !v_rest.is_finite() || !v_reset.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "v_rest/v_reset",
                format!("{} / {}", v_rest, v_reset),
                "finite",
            ));
        }
        if !(v_threshold > v_reset) || !v_threshold.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "v_threshold",
                format!("{} (with v_reset={})", v_threshold, v_reset),
                "> v_reset",
            ));
        }
        validate_decay("trace_decay", trace_decay)?;

        Ok(Self {
            tau_rc,
            v_rest,
            v_reset,
            v_threshold,
            t_refractory,
            trace_decay,
        })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(
            self.tau_rc,
            self.v_rest,
            self.v_reset,
            self.v_threshold,
            self.t_refractory,
            self.trace_decay,
        )?;
        Ok(())
    }
}

fn validate_decay(parameter: &str, decay: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&decay) {
        return Err(RuntimeError::invalid_parameter(
            parameter,
            decay.to_string(),
            "within [0.0, 1.0]",
        ));
    }
    Ok(())
}

fn validate_size(n: usize) -> Result<()> {
    if n == 0 {
        return Err(RuntimeError::invalid_parameter("n", "0", "> 0"));
    }
    Ok(())
}

fn check_len(context: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RuntimeError::shape_mismatch(context, [expected], [actual]));
    }
    Ok(())
}

/// `trace = trace * decay + spikes`
fn decay_trace(trace: &mut Array1<f32>, spikes: &Array1<bool>, decay: f32) {
    Zip::from(trace).and(spikes).for_each(|x, &s| {
        *x = *x * decay + f32::from(s);
    });
}

/// Population whose spikes are set directly from external input
#[derive(Debug, Clone)]
pub struct InputNodes {
    /// Population parameters
    pub params: InputParams,
    spikes: Array1<bool>,
    trace: Array1<f32>,
}

impl InputNodes {
    /// Create an input population of `n` units
    pub fn new(n: usize, params: InputParams) -> Result<Self> {
        validate_size(n)?;
        params.validate()?;
        Ok(Self {
            params,
            spikes: Array1::from_elem(n, false),
            trace: Array1::zeros(n),
        })
    }

    /// Advance one timestep with the given spikes
    pub fn step(&mut self, spikes: ArrayView1<'_, bool>) -> Result<()> {
        check_len("input spikes", self.len(), spikes.len())?;
        self.spikes.assign(&spikes);
        decay_trace(&mut self.trace, &self.spikes, self.params.trace_decay);
        Ok(())
    }

    /// Number of units
    pub fn len(&self) -> usize {
        self.spikes.len()
    }

    /// Always false, populations are never empty
    pub fn is_empty(&self) -> bool {
        self.spikes.is_empty()
    }

    /// Spikes of the last timestep
    pub fn spikes(&self) -> &Array1<bool> {
        &self.spikes
    }

    /// Spike traces
    pub fn trace(&self) -> &Array1<f32> {
        &self.trace
    }

    /// Clear spikes and traces
    pub fn reset_state(&mut self) {
        self.spikes.fill(false);
        self.trace.fill(0.0);
    }
}

/// Leaky integrate-and-fire population
#[derive(Debug, Clone)]
pub struct LifNodes {
    /// Population parameters
    pub params: LifParams,
    voltage: Array1<f32>,
    refractory: Array1<u32>,
    spikes: Array1<bool>,
    trace: Array1<f32>,
}

impl LifNodes {
    /// Create a LIF population of `n` neurons at rest
    pub fn new(n: usize, params: LifParams) -> Result<Self> {
        validate_size(n)?;
        params.validate()?;
        Ok(Self {
            voltage: Array1::from_elem(n, params.v_rest),
            refractory: Array1::zeros(n),
            spikes: Array1::from_elem(n, false),
            trace: Array1::zeros(n),
            params,
        })
    }

    /// Advance one timestep with the given input current
    pub fn step(&mut self, current: ArrayView1<'_, f32>) -> Result<()> {
        check_len("LIF input current", self.len(), current.len())?;
        let p = &self.params;

        Zip::from(&mut self.voltage)
            .and(&mut self.refractory)
            .and(&mut self.spikes)
            .and(&current)
            .for_each(|v, countdown, spike, &i| {
                if *countdown > 0 {
                    *countdown -= 1;
                    *spike = false;
                    return;
                }

                *v += (p.v_rest + i - *v) / p.tau_rc;

                if *v >= p.v_threshold {
                    *spike = true;
                    *v = p.v_reset;
                    *countdown = p.t_refractory;
                } else {
                    *spike = false;
                }
            });

        decay_trace(&mut self.trace, &self.spikes, p.trace_decay);
        Ok(())
    }

    /// Number of neurons
    pub fn len(&self) -> usize {
        self.spikes.len()
    }

    /// Always false, populations are never empty
    pub fn is_empty(&self) -> bool {
        self.spikes.is_empty()
    }

    /// Spikes of the last timestep
    pub fn spikes(&self) -> &Array1<bool> {
        &self.spikes
    }

    /// Spike traces
    pub fn trace(&self) -> &Array1<f32> {
        &self.trace
    }

    /// Membrane potentials
    pub fn voltage(&self) -> &Array1<f32> {
        &self.voltage
    }

    /// Remaining refractory timesteps per neuron
    pub fn refractory(&self) -> &Array1<u32> {
        &self.refractory
    }

    /// Return every neuron to rest
    pub fn reset_state(&mut self) {
        self.voltage.fill(self.params.v_rest);
        self.refractory.fill(0);
        self.spikes.fill(false);
        self.trace.fill(0.0);
    }
}

/// Kind of a node population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Driven by external spikes
    Input,
    /// Leaky integrate-and-fire
    Lif,
}

/// A node population registered in a network
#[derive(Debug, Clone)]
pub enum Layer {
    /// Input population
    Input(InputNodes),
    /// LIF population
    Lif(LifNodes),
}

impl Layer {
    /// Input layer of `n` units with default parameters
    pub fn input(n: usize) -> Result<Self> {
        Ok(Self::Input(InputNodes::new(n, InputParams::default())?))
    }

    /// LIF layer of `n` neurons with default parameters
    pub fn lif(n: usize) -> Result<Self> {
        Ok(Self::Lif(LifNodes::new(n, LifParams::default())?))
    }

    /// Population kind
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Input(_) => LayerKind::Input,
            Self::Lif(_) => LayerKind::Lif,
        }
    }

    /// Number of units
    pub fn len(&self) -> usize {
        match self {
            Self::Input(nodes) => nodes.len(),
            Self::Lif(nodes) => nodes.len(),
        }
    }

    /// Always false, populations are never empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spikes of the last timestep
    pub fn spikes(&self) -> &Array1<bool> {
        match self {
            Self::Input(nodes) => nodes.spikes(),
            Self::Lif(nodes) => nodes.spikes(),
        }
    }

    /// Spike traces
    pub fn trace(&self) -> &Array1<f32> {
        match self {
            Self::Input(nodes) => nodes.trace(),
            Self::Lif(nodes) => nodes.trace(),
        }
    }

    /// Number of units that spiked in the last timestep
    pub fn spike_count(&self) -> usize {
        self.spikes().iter().filter(|&&s| s).count()
    }

    /// Reset dynamic state
    pub fn reset_state(&mut self) {
        match self {
            Self::Input(nodes) => nodes.reset_state(),
            Self::Lif(nodes) => nodes.reset_state(),
        }
    }
}

impl From<InputNodes> for Layer {
    fn from(nodes: InputNodes) -> Self {
        Self::Input(nodes)
    }
}

impl From<LifNodes> for Layer {
    fn from(nodes: LifNodes) -> Self {
        Self::Lif(nodes)
    }
}

impl Monitorable for Layer {
    fn width(&self, variable: StateVariable) -> Option<usize> {
        match (self, variable) {
            (_, StateVariable::Spikes | StateVariable::Trace) => Some(self.len()),
            (Self::Lif(_), StateVariable::Voltage | StateVariable::Refractory) => Some(self.len()),
            _ => None,
        }
    }

    fn read_into(&self, variable: StateVariable, mut out: ArrayViewMut1<'_, f32>) {
        match (self, variable) {
            (_, StateVariable::Spikes) => {
                Zip::from(&mut out).and(self.spikes()).for_each(|o, &s| *o = f32::from(s));
            }
            (_, StateVariable::Trace) => out.assign(self.trace()),
            (Self::Lif(nodes), StateVariable::Voltage) => out.assign(nodes.voltage()),
            (Self::Lif(nodes), StateVariable::Refractory) => {
                Zip::from(&mut out).and(nodes.refractory()).for_each(|o, &c| *o = c as f32);
            }
            _ => {}
        }
    }
}
