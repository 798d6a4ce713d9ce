//! Bernoulli rate-to-spike encoding

use ndarray::{Array2, ArrayView1};
use rand::Rng;

use crate::error::*;

/// Encodes rate vectors as Bernoulli spike trains
///
/// Each element `x` of a rate vector spikes independently at every timestep
/// with probability `clamp(x * max_prob, 0, 1)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct BernoulliEncoder {
    /// Timesteps per encoded sample
    pub time: usize,
    /// Spike probability of a unit-rate element
    pub max_prob: f32,
}

impl Default for BernoulliEncoder {
    fn default() -> Self {
        Self {
            time: 1,
            max_prob: 1.0,
        }
    }
}

impl BernoulliEncoder {
    /// Create a validated encoder
    pub fn new(time: usize, max_prob: f32) -> Result<Self> {
        let encoder = Self { time, max_prob };
        encoder.validate()?;
        Ok(encoder)
    }

    /// Validate parameters
    pub fn validate(&self) -> Result<()> {
        if self.time == 0 {
            return Err(RuntimeError::invalid_parameter("time", "0", ">= 1"));
        }
        if !(self.max_prob > 0.0 && self.max_prob <= 1.0) {
            return Err(RuntimeError::invalid_parameter(
                "max_prob",
                self.max_prob.to_string(),
                "within (0.0, 1.0]",
            ));
        }
        Ok(())
    }

    /// Spike probability for rate `x`
    #[inline]
    pub fn probability(&self, x: f32) -> f32 {
        (x * self.max_prob).clamp(0.0, 1.0)
    }

    /// Encode one rate vector into a `(time, N)` spike tensor
    pub fn encode<R: Rng + ?Sized>(&self, datum: ArrayView1<'_, f32>, rng: &mut R) -> Array2<bool> {
        let probabilities = datum.mapv(|x| self.probability(x));
        // gen::<f32>() lies in [0, 1): p = 1 always fires, p = 0 never does
        Array2::from_shape_fn((self.time, datum.len()), |(_, j)| rng.gen::<f32>() < probabilities[j])
    }

    /// Lazily encode the rows of a `(samples, N)` data matrix
    pub fn loader<R: Rng>(self, data: Array2<f32>, rng: R) -> Result<BernoulliLoader<R>> {
        self.validate()?;
        if data.iter().any(|x| !x.is_finite()) {
            return Err(RuntimeError::invalid_parameter("data", "non-finite rate", "finite"));
        }
        Ok(BernoulliLoader {
            encoder: self,
            data,
            cursor: 0,
            rng,
        })
    }
}

/// Endless iterator of encoded samples
///
/// Yields one `(time, N)` spike tensor per call to `next`, walking the data
/// rows in order and starting over after the last one. An empty data matrix
/// yields nothing.
#[derive(Debug, Clone)]
pub struct BernoulliLoader<R> {
    encoder: BernoulliEncoder,
    data: Array2<f32>,
    cursor: usize,
    rng: R,
}

impl<R: Rng> BernoulliLoader<R> {
    /// Encoder parameters
    pub fn encoder(&self) -> &BernoulliEncoder {
        &self.encoder
    }

    /// Number of data rows
    pub fn samples(&self) -> usize {
        self.data.nrows()
    }

    /// Width of each encoded sample
    pub fn width(&self) -> usize {
        self.data.ncols()
    }
}

impl<R: Rng> Iterator for BernoulliLoader<R> {
    type Item = Array2<bool>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.nrows() == 0 {
            return None;
        }
        let spikes = self.encoder.encode(self.data.row(self.cursor), &mut self.rng);
        self.cursor = (self.cursor + 1) % self.data.nrows();
        Some(spikes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_encoder_validation() {
        assert!(BernoulliEncoder::new(0, 0.5).is_err());
        assert!(BernoulliEncoder::new(1, 0.0).is_err());
        assert!(BernoulliEncoder::new(1, 1.5).is_err());
        assert!(BernoulliEncoder::new(3, 0.05).is_ok());
    }

    #[test]
    fn test_probability_clamped() {
        let encoder = BernoulliEncoder::new(1, 0.5).unwrap();
        assert_eq!(encoder.probability(4.0), 1.0);
        assert_eq!(encoder.probability(-1.0), 0.0);
        assert_eq!(encoder.probability(0.5), 0.25);
    }

    #[test]
    fn test_encode_shape_and_extremes() {
        let encoder = BernoulliEncoder::new(5, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let spikes = encoder.encode(array![0.0f32, 1.0, 2.0].view(), &mut rng);

        assert_eq!(spikes.dim(), (5, 3));
        assert!(spikes.column(0).iter().all(|&s| !s));
        assert!(spikes.column(1).iter().all(|&s| s));
        assert!(spikes.column(2).iter().all(|&s| s));
    }

    #[test]
    fn test_loader_cycles_over_data() {
        let encoder = BernoulliEncoder::new(1, 1.0).unwrap();
        let data = array![[1.0f32, 0.0], [0.0, 1.0]];
        let mut loader = encoder.loader(data, StdRng::seed_from_u64(0)).unwrap();

        let rows: Vec<Array2<bool>> = loader.by_ref().take(3).collect();
        assert_eq!(rows[0], array![[true, false]]);
        assert_eq!(rows[1], array![[false, true]]);
        assert_eq!(rows[2], array![[true, false]]);
        assert_eq!(loader.samples(), 2);
    }

    #[test]
    fn test_loader_empty_and_invalid_data() {
        let encoder = BernoulliEncoder::new(1, 1.0).unwrap();
        let mut empty = encoder.clone().loader(Array2::zeros((0, 4)), StdRng::seed_from_u64(0)).unwrap();
        assert!(empty.next().is_none());

        let bad = array![[f32::NAN]];
        assert!(encoder.loader(bad, StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn test_encode_deterministic_with_seed() {
        let encoder = BernoulliEncoder::new(4, 0.5).unwrap();
        let datum = Array1::from_elem(16, 0.7f32);
        let a = encoder.encode(datum.view(), &mut StdRng::seed_from_u64(11));
        let b = encoder.encode(datum.view(), &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }
}
