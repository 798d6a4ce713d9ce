//! Reward-modulated plasticity rules

use std::fmt;

use ndarray::{Array1, Array2, Zip};

use crate::{error::*, neuron::Layer};

/// Global reward signal broadcast to every synapse of a connection
#[derive(Debug, Clone, PartialEq)]
pub enum Reward {
    /// One value for all synapses
    Scalar(f32),
    /// One value per target neuron, broadcast along the source axis
    PerTarget(Array1<f32>),
}

impl Reward {
    /// Reward seen by synapses onto target neuron `j`
    #[inline]
    pub fn at(&self, j: usize) -> f32 {
        match self {
            Self::Scalar(r) => *r,
            Self::PerTarget(r) => r[j],
        }
    }

    /// Sum over targets (`Scalar` counts once)
    pub fn total(&self) -> f32 {
        match self {
            Self::Scalar(r) => *r,
            Self::PerTarget(r) => r.sum(),
        }
    }

    /// Check that the reward broadcasts against a target of `n` neurons
    pub fn check_target(&self, n: usize) -> Result<()> {
        match self {
            Self::Scalar(_) => Ok(()),
            Self::PerTarget(r) if r.len() == n => Ok(()),
            Self::PerTarget(r) => Err(RuntimeError::shape_mismatch("reward", [n], [r.len()])),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            Self::Scalar(r) => r.is_finite(),
            Self::PerTarget(r) => r.iter().all(|v| v.is_finite()),
        }
    }
}

impl Default for Reward {
    fn default() -> Self {
        Self::Scalar(0.0)
    }
}

impl From<f32> for Reward {
    fn from(r: f32) -> Self {
        Self::Scalar(r)
    }
}

impl From<Array1<f32>> for Reward {
    fn from(r: Array1<f32>) -> Self {
        Self::PerTarget(r)
    }
}

/// Per-timestep learning inputs forwarded by `Network::run` to every connection
#[derive(Debug, Clone, PartialEq)]
pub struct LearningContext {
    /// Reward signal
    pub reward: Reward,
    /// Potentiation magnitude
    pub a_plus: f32,
    /// Depression magnitude
    pub a_minus: f32,
}

impl Default for LearningContext {
    fn default() -> Self {
        Self {
            reward: Reward::Scalar(0.0),
            a_plus: 1.0,
            a_minus: 0.0,
        }
    }
}

impl LearningContext {
    /// Create a validated learning context
    pub fn new(reward: impl Into<Reward>, a_plus: f32, a_minus: f32) -> Result<Self> {
        let reward = reward.into();
        if !reward.is_finite() {
            return Err(RuntimeError::invalid_parameter(
                "reward",
                format!("{:?}", reward),
                "finite",
            ));
        }
        for (name, value) in [("a_plus", a_plus), ("a_minus", a_minus)] {
            if !value.is_finite() {
                return Err(RuntimeError::invalid_parameter(name, value.to_string(), "finite"));
            }
        }
        Ok(Self {
            reward,
            a_plus,
            a_minus,
        })
    }

    /// Build a context from `(key, value)` pairs, starting from the defaults
    ///
    /// Recognised keys are `reward`, `a_plus` and `a_minus`; anything else is
    /// rejected.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, f32)>) -> Result<Self> {
        let mut ctx = Self::default();
        for (key, value) in pairs {
            match key {
                "reward" => ctx.reward = Reward::Scalar(value),
                "a_plus" => ctx.a_plus = value,
                "a_minus" => ctx.a_minus = value,
                _ => {
                    return Err(RuntimeError::invalid_parameter(
                        key,
                        value.to_string(),
                        "one of reward, a_plus, a_minus",
                    ))
                }
            }
        }
        Self::new(ctx.reward, ctx.a_plus, ctx.a_minus)
    }

    /// Replace the reward
    pub fn with_reward(mut self, reward: impl Into<Reward>) -> Self {
        self.reward = reward.into();
        self
    }
}

/// Mutable synapse state handed to a learning rule
#[derive(Debug)]
pub struct SynapsesMut<'a> {
    /// Weights, shape `(n_source, n_target)`
    pub weights: &'a mut Array2<f32>,
    /// Eligibility traces, same shape as `weights`
    pub eligibility: &'a mut Array2<f32>,
    /// Learning rate
    pub nu: f32,
}

impl SynapsesMut<'_> {
    /// Check that the layers and reward broadcast against the weight matrix
    pub fn check(&self, source: &Layer, target: &Layer, ctx: &LearningContext) -> Result<()> {
        let (rows, cols) = self.weights.dim();
        if self.eligibility.dim() != (rows, cols) {
            let (er, ec) = self.eligibility.dim();
            return Err(RuntimeError::shape_mismatch("eligibility", [rows, cols], [er, ec]));
        }
        if source.len() != rows || target.len() != cols {
            return Err(RuntimeError::shape_mismatch(
                "learning layers",
                [rows, cols],
                [source.len(), target.len()],
            ));
        }
        ctx.reward.check_target(cols)
    }
}

/// Trait for plasticity rules
///
/// Rules are stateless; per-synapse memory lives in [`SynapsesMut`], owned by
/// the connection. Clamping to the weight bounds is done by the connection
/// after `update` returns.
pub trait LearningRule: fmt::Debug + Send + Sync {
    /// Rule name for logging
    fn name(&self) -> &'static str;

    /// Apply one timestep of learning
    ///
    /// Fails with `ShapeMismatch` when the layers or the reward do not match
    /// the synapse matrix; nothing is modified in that case.
    fn update(&self, source: &Layer, target: &Layer, synapses: SynapsesMut<'_>, ctx: &LearningContext) -> Result<()>;
}

/// Parameters for [`MstdpEt`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct MstdpEtParams {
    /// Multiplicative eligibility decay per timestep
    pub elig_decay: f32,
}

impl Default for MstdpEtParams {
    fn default() -> Self {
        // exp(-1/25): 25-step eligibility time constant
        Self { elig_decay: 0.96 }
    }
}

impl MstdpEtParams {
    /// Create new parameters with validation
    pub fn new(elig_decay: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&elig_decay) {
            return Err(RuntimeError::invalid_parameter(
                "elig_decay",
                elig_decay.to_string(),
                "within [0.0, 1.0]",
            ));
        }
        Ok(Self { elig_decay })
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        Self::new(self.elig_decay)?;
        Ok(())
    }
}

/// Modulated STDP with eligibility trace
///
/// ```text
/// elig = elig * elig_decay
///      + a_plus  * outer(source.trace,  target.spikes)
///      - a_minus * outer(source.spikes, target.trace)
/// w   += nu * reward * elig
/// ```
///
/// Potentiation when the target fires while the source trace is elevated,
/// depression when the source fires while the target trace is elevated.
#[derive(Debug, Clone, PartialEq)]
pub struct MstdpEt {
    /// Rule parameters
    pub params: MstdpEtParams,
}

impl MstdpEt {
    /// Create the rule
    pub fn new(params: MstdpEtParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl Default for MstdpEt {
    fn default() -> Self {
        Self {
            params: MstdpEtParams::default(),
        }
    }
}

impl LearningRule for MstdpEt {
    fn name(&self) -> &'static str {
        "mstdp_et"
    }

    fn update(&self, source: &Layer, target: &Layer, synapses: SynapsesMut<'_>, ctx: &LearningContext) -> Result<()> {
        synapses.check(source, target, ctx)?;
        let decay = self.params.elig_decay;
        let (a_plus, a_minus) = (ctx.a_plus, ctx.a_minus);

        let pre_trace = source.trace();
        let pre_spikes = source.spikes();
        let post_trace = target.trace();
        let post_spikes = target.spikes();

        Zip::indexed(&mut *synapses.eligibility).for_each(|(i, j), e| {
            let potentiation = pre_trace[i] * f32::from(post_spikes[j]);
            let depression = f32::from(pre_spikes[i]) * post_trace[j];
            let next = *e * decay + a_plus * potentiation - a_minus * depression;
            // inf - inf after overflow
            *e = if next.is_nan() { 0.0 } else { next };
        });

        let nu = synapses.nu;
        let reward = &ctx.reward;
        Zip::indexed(&mut *synapses.weights)
            .and(&*synapses.eligibility)
            .for_each(|(_, j), w, &e| {
                if e == 0.0 {
                    return;
                }
                let delta = nu * reward.at(j) * e;
                if !delta.is_nan() {
                    *w += delta;
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neuron::{InputNodes, InputParams, LifNodes, LifParams};
    use ndarray::array;

    fn fired_layers() -> (Layer, Layer) {
        // Source: unit 0 spiked one step ago, unit 1 spikes now
        let mut source = InputNodes::new(2, InputParams::new(0.5).unwrap()).unwrap();
        source.step(array![true, false].view()).unwrap();
        source.step(array![false, true].view()).unwrap();

        // Target: neuron 0 spikes now (tau_rc = 1 jumps to the input)
        let params = LifParams::new(1.0, 0.0, 0.0, 1.0, 0, 0.5).unwrap();
        let mut target = LifNodes::new(2, params).unwrap();
        target.step(array![2.0, 0.0].view()).unwrap();

        (Layer::Input(source), Layer::Lif(target))
    }

    #[test]
    fn test_mstdp_et_params_validation() {
        assert!(MstdpEtParams::new(1.5).is_err());
        assert!(MstdpEtParams::new(0.9).is_ok());
        assert!(MstdpEtParams::default().validate().is_ok());
    }

    #[test]
    fn test_learning_context_from_pairs() {
        let ctx = LearningContext::from_pairs([("reward", 0.5), ("a_minus", 0.25)]).unwrap();
        assert_eq!(ctx.reward, Reward::Scalar(0.5));
        assert_eq!(ctx.a_plus, 1.0);
        assert_eq!(ctx.a_minus, 0.25);

        let err = LearningContext::from_pairs([("gamma", 1.0)]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidParameter { .. }));

        assert!(LearningContext::new(f32::NAN, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_reward_broadcast_check() {
        assert!(Reward::Scalar(1.0).check_target(3).is_ok());
        assert!(Reward::PerTarget(array![1.0f32, 2.0, 3.0]).check_target(3).is_ok());
        let err = Reward::PerTarget(array![1.0f32]).check_target(3).unwrap_err();
        assert!(matches!(err, RuntimeError::ShapeMismatch { .. }));
        assert_eq!(Reward::PerTarget(array![1.0f32, -3.0]).total(), -2.0);
    }

    #[test]
    fn test_eligibility_update() {
        let (source, target) = fired_layers();
        let rule = MstdpEt::new(MstdpEtParams::new(0.5).unwrap()).unwrap();
        let mut weights = Array2::zeros((2, 2));
        let mut eligibility = Array2::from_elem((2, 2), 1.0);
        let ctx = LearningContext::new(0.0f32, 1.0, 2.0).unwrap();

        rule.update(
            &source,
            &target,
            SynapsesMut { weights: &mut weights, eligibility: &mut eligibility, nu: 1.0 },
            &ctx,
        )
        .unwrap();

        // source.trace = [0.5, 1.0], source.spikes = [0, 1]
        // target.trace = [1.0, 0.0], target.spikes = [1, 0]
        let expected: Array2<f32> = array![
            [0.5 + 0.5, 0.5],
            [0.5 + 1.0 - 2.0, 0.5],
        ];
        assert_eq!(eligibility, expected);
        // Zero reward leaves weights alone
        assert!(weights.iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_reward_scales_weight_change() {
        let (source, target) = fired_layers();
        let rule = MstdpEt::new(MstdpEtParams::new(0.0).unwrap()).unwrap();
        let mut weights = Array2::zeros((2, 2));
        let mut eligibility = Array2::zeros((2, 2));
        let ctx = LearningContext::new(array![2.0f32, -1.0], 1.0, 0.0).unwrap();

        rule.update(
            &source,
            &target,
            SynapsesMut { weights: &mut weights, eligibility: &mut eligibility, nu: 0.5 },
            &ctx,
        )
        .unwrap();

        // elig = outer([0.5, 1.0], [1, 0]); dw = 0.5 * reward_j * elig
        assert_eq!(weights, array![[0.5f32, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_mismatched_reward_rejected_without_mutation() {
        let (source, target) = fired_layers();
        let rule = MstdpEt::default();
        let mut weights = Array2::from_elem((2, 2), 0.5);
        let mut eligibility = Array2::zeros((2, 2));
        let ctx = LearningContext::new(array![1.0f32], 1.0, 0.0).unwrap();

        let err = rule
            .update(
                &source,
                &target,
                SynapsesMut { weights: &mut weights, eligibility: &mut eligibility, nu: 1.0 },
                &ctx,
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ShapeMismatch { .. }));
        assert!(weights.iter().all(|&w| w == 0.5));
        assert!(eligibility.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn test_overflowing_rate_keeps_weights_finite() {
        let (source, target) = fired_layers();
        let rule = MstdpEt::new(MstdpEtParams::new(0.0).unwrap()).unwrap();
        let mut weights = Array2::from_elem((2, 2), 0.5);
        let mut eligibility = Array2::zeros((2, 2));
        let ctx = LearningContext::new(f32::MAX, f32::MAX, f32::MAX).unwrap();

        rule.update(
            &source,
            &target,
            SynapsesMut { weights: &mut weights, eligibility: &mut eligibility, nu: f32::MAX },
            &ctx,
        )
        .unwrap();

        // Zero eligibility never moves a weight, even when nu * reward overflows
        assert_eq!(weights[[0, 1]], 0.5);
        assert_eq!(weights[[1, 1]], 0.5);
        assert!(weights.iter().all(|w| !w.is_nan()));
        assert!(eligibility.iter().all(|e| !e.is_nan()));
    }
}
