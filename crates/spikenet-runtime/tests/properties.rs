//! Property-based tests using proptest

use ndarray::Array1;
use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use spikenet_runtime::*;

fn plastic_network(w_min: f32, w_max: f32, nu: f32, seed: u64) -> Network {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut network = Network::default();
    network.add_layer("X", Layer::input(3).unwrap()).unwrap();
    // Fast membrane so the target fires often and eligibility moves both ways
    let lif = LifParams::new(1.0, 0.0, 0.0, 0.5, 1, 0.8).unwrap();
    network.add_layer("Y", LifNodes::new(4, lif).unwrap()).unwrap();

    let params = ConnectionParams::new(w_min, w_max, nu).unwrap();
    let connection = Connection::random(3, 4, w_min - 1.0, w_max + 1.0, params, &mut rng)
        .unwrap()
        .with_rule(MstdpEt::default());
    network.add_connection("X", "Y", connection).unwrap();
    network
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn weights_stay_within_bounds(
        w_min in -1.0f32..0.5,
        width in 0.0f32..2.0,
        nu in 0.0f32..5.0,
        a_minus in 0.0f32..2.0,
        rewards in prop::collection::vec(-10.0f32..10.0, 1..40),
        seed in any::<u64>(),
    ) {
        let w_max = w_min + width;
        let mut network = plastic_network(w_min, w_max, nu, seed);
        let encoder = BernoulliEncoder::new(1, 0.8).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let rates = Array1::from_elem(3, 1.0f32);

        for reward in rewards {
            let mut inputs = Inputs::new();
            inputs.insert("X".to_string(), encoder.encode(rates.view(), &mut rng));
            let ctx = LearningContext::new(reward, 1.0, a_minus).unwrap();
            network.run(&inputs, 1, &ctx).unwrap();

            let weights = network.connection("X", "Y").unwrap().weights();
            prop_assert!(
                weights.iter().all(|&w| w >= w_min && w <= w_max),
                "weights {:?} outside [{}, {}]", weights, w_min, w_max
            );
        }
    }

    #[test]
    fn per_target_reward_keeps_bounds(
        rewards in prop::collection::vec(-3.0f32..3.0, 4),
        steps in 1usize..30,
        seed in any::<u64>(),
    ) {
        let mut network = plastic_network(0.0, 1.0, 1.0, seed);
        let encoder = BernoulliEncoder::new(steps, 0.9).unwrap();
        let mut inputs = Inputs::new();
        inputs.insert(
            "X".to_string(),
            encoder.encode(Array1::from_elem(3, 1.0f32).view(), &mut StdRng::seed_from_u64(seed)),
        );

        let ctx = LearningContext::new(Array1::from(rewards), 1.0, 0.5).unwrap();
        let summary = network.run(&inputs, steps, &ctx).unwrap();

        prop_assert_eq!(summary.steps, steps);
        let weights = network.connection("X", "Y").unwrap().weights();
        prop_assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn encoder_rate_converges_to_probability(
        x in 0.0f32..2.0,
        max_prob in 0.01f32..=1.0,
        seed in any::<u64>(),
    ) {
        let samples = 20_000;
        let encoder = BernoulliEncoder::new(samples, max_prob).unwrap();
        let spikes = encoder.encode(Array1::from_elem(1, x).view(), &mut StdRng::seed_from_u64(seed));

        let p = (x * max_prob).min(1.0);
        let rate = spikes.iter().filter(|&&s| s).count() as f32 / samples as f32;
        // Five standard deviations of the sample mean
        let tolerance = 5.0 * (p * (1.0 - p) / samples as f32).sqrt() + 1e-6;
        prop_assert!(
            (rate - p).abs() <= tolerance,
            "rate {} vs probability {} (tolerance {})", rate, p, tolerance
        );
    }
}
