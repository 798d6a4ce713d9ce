//! Dense weighted connections between node populations

use ndarray::{Array1, Array2, ArrayViewMut1};
use rand::Rng;

use crate::{
    error::*,
    monitor::{Monitorable, StateVariable},
    neuron::Layer,
    plasticity::{LearningContext, LearningRule, SynapsesMut},
};

/// Weight bounds and learning rate of a connection
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct ConnectionParams {
    /// Minimum weight value
    pub w_min: f32,
    /// Maximum weight value
    pub w_max: f32,
    /// Learning rate
    pub nu: f32,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            w_min: 0.0,
            w_max: 1.0,
            nu: 1.0,
        }
    }
}

impl ConnectionParams {
    /// Create new connection parameters with validation
    pub fn new(w_min: f32, w_max: f32, nu: f32) -> Result<Self> {
        if !w_min.is_finite() || !w_max.is_finite() || w_max < w_min {
            return Err(RuntimeError::invalid_parameter(
                "w_max",
                format!("{} (with w_min={})", w_max, w_min),
                ">= w_min, both finite",
            ));
        }
        if !nu.is_finite() {
            return Err(RuntimeError::invalid_parameter("nu", nu.to_string(), "finite"));
        }
        Ok(Self { w_min, w_max, nu })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.w_min, self.w_max, self.nu)?;
        Ok(())
    }
}

/// Weight matrix of shape `(n_source, n_target)` with an optional learning rule
///
/// A connection does not know its endpoints; the network tags it with the
/// (source, target) layer names when it is added.
#[derive(Debug)]
pub struct Connection {
    /// Bounds and learning rate
    pub params: ConnectionParams,
    weights: Array2<f32>,
    eligibility: Array2<f32>,
    rule: Option<Box<dyn LearningRule>>,
}

impl Connection {
    /// Create a connection from an explicit weight matrix
    ///
    /// Initial weights are clamped into `[w_min, w_max]`.
    pub fn new(weights: Array2<f32>, params: ConnectionParams) -> Result<Self> {
        params.validate()?;
        let (rows, cols) = weights.dim();
        if rows == 0 || cols == 0 {
            return Err(RuntimeError::invalid_parameter(
                "weights",
                format!("{}x{}", rows, cols),
                "non-empty matrix",
            ));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(RuntimeError::invalid_parameter("weights", "non-finite entry", "finite"));
        }

        let mut connection = Self {
            params,
            eligibility: Array2::zeros((rows, cols)),
            weights,
            rule: None,
        };
        connection.clamp();
        Ok(connection)
    }

    /// Every weight set to `value`
    pub fn uniform(n_source: usize, n_target: usize, value: f32, params: ConnectionParams) -> Result<Self> {
        Self::new(Array2::from_elem((n_source, n_target), value), params)
    }

    /// Weights drawn uniformly from `[low, high)`
    pub fn random<R: Rng + ?Sized>(
        n_source: usize,
        n_target: usize,
        low: f32,
        high: f32,
        params: ConnectionParams,
        rng: &mut R,
    ) -> Result<Self> {
        if !(low < high) {
            return Err(RuntimeError::invalid_parameter(
                "high",
                format!("{} (with low={})", high, low),
                "> low",
            ));
        }
        let weights = Array2::from_shape_fn((n_source, n_target), |_| rng.gen_range(low..high));
        Self::new(weights, params)
    }

    /// Attach a learning rule
    pub fn with_rule(mut self, rule: impl LearningRule + 'static) -> Self {
        self.rule = Some(Box::new(rule));
        self
    }

    /// `(n_source, n_target)`
    pub fn shape(&self) -> (usize, usize) {
        self.weights.dim()
    }

    /// Current weights
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Current eligibility traces
    pub fn eligibility(&self) -> &Array2<f32> {
        &self.eligibility
    }

    /// Attached learning rule, if any
    pub fn rule(&self) -> Option<&dyn LearningRule> {
        self.rule.as_deref()
    }

    /// Replace the weight matrix; entries are clamped into bounds
    pub fn set_weights(&mut self, weights: Array2<f32>) -> Result<()> {
        if weights.dim() != self.weights.dim() {
            let (r, c) = self.weights.dim();
            let (ar, ac) = weights.dim();
            return Err(RuntimeError::shape_mismatch("connection weights", [r, c], [ar, ac]));
        }
        self.weights = weights;
        self.clamp();
        Ok(())
    }

    /// Current injected into the target: `spikes(source) · W`
    pub fn compute_input(&self, source: &Layer) -> Result<Array1<f32>> {
        let (rows, _) = self.weights.dim();
        if source.len() != rows {
            return Err(RuntimeError::shape_mismatch("connection source", [rows], [source.len()]));
        }
        let spikes = source.spikes().mapv(f32::from);
        Ok(spikes.dot(&self.weights))
    }

    /// Run the learning rule for one timestep, then clamp the weights
    ///
    /// Fails with `ShapeMismatch` if `source` or `target` do not match the
    /// weight matrix, or if a rule is attached and a per-target reward does
    /// not match the target.
    pub fn update(&mut self, source: &Layer, target: &Layer, ctx: &LearningContext) -> Result<()> {
        let synapses = SynapsesMut {
            weights: &mut self.weights,
            eligibility: &mut self.eligibility,
            nu: self.params.nu,
        };
        match &self.rule {
            Some(rule) => {
                synapses.check(source, target, ctx)?;
                rule.update(source, target, synapses, ctx)?;
            }
            None => {
                let (rows, cols) = synapses.weights.dim();
                if source.len() != rows || target.len() != cols {
                    return Err(RuntimeError::shape_mismatch(
                        "learning layers",
                        [rows, cols],
                        [source.len(), target.len()],
                    ));
                }
            }
        }
        self.clamp();
        Ok(())
    }

    /// Zero eligibility traces; weights are kept
    pub fn reset_state(&mut self) {
        self.eligibility.fill(0.0);
    }

    /// Mean weight
    pub fn mean_weight(&self) -> f32 {
        self.weights.mean().unwrap_or(0.0)
    }

    fn clamp(&mut self) {
        let (w_min, w_max) = (self.params.w_min, self.params.w_max);
        // NaN compares false everywhere, so it would survive f32::clamp
        self.weights
            .mapv_inplace(|w| if w.is_nan() { w_min } else { w.clamp(w_min, w_max) });
        debug_assert!(
            self.weights.iter().all(|&w| (w_min..=w_max).contains(&w)),
            "weight outside [{}, {}] after clamping",
            w_min,
            w_max
        );
    }
}

impl Monitorable for Connection {
    fn width(&self, variable: StateVariable) -> Option<usize> {
        match variable {
            StateVariable::Weights | StateVariable::Eligibility => Some(self.weights.len()),
            _ => None,
        }
    }

    fn read_into(&self, variable: StateVariable, mut out: ArrayViewMut1<'_, f32>) {
        let source = match variable {
            StateVariable::Weights => &self.weights,
            StateVariable::Eligibility => &self.eligibility,
            _ => return,
        };
        // Logical (row-major) order regardless of memory layout
        for (o, &v) in out.iter_mut().zip(source.iter()) {
            *o = v;
        }
    }
}
