//! Frequency-matching experiment
//!
//! An input layer `X` drives an LIF layer `Y` through a plastic all-to-all
//! connection. Each output neuron has a target firing rate; the per-neuron
//! reward is the negated gap between its running average rate and its
//! target, so learning pushes every output rate towards its target.

use std::collections::BTreeMap;
use std::io::Write;

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{rngs::StdRng, Rng};
use serde::Serialize;
use spikenet_runtime::{
    BernoulliLoader, CancelToken, Connection, Inputs, InputNodes, LearningContext, LifNodes, Monitor, MstdpEt,
    Network, Reward, SimulationContext, StateVariable,
};
use tracing::{debug, info};

use crate::config::ExperimentConfig;
use crate::error::{CliError, CliResult};

/// Input layer name
pub const INPUT_LAYER: &str = "X";
/// Output layer name
pub const OUTPUT_LAYER: &str = "Y";

/// Result of a frequency-matching run
#[derive(Debug, Clone, Serialize)]
pub struct FreqMatchReport {
    /// Seed the experiment ran with
    pub seed: u64,
    /// Units per layer
    pub n: usize,
    /// Requested iterations
    pub iterations: usize,
    /// Iterations that finished
    pub completed: usize,
    /// Whether the run stopped on cancellation
    pub cancelled: bool,
    /// Summed reward after the last completed iteration
    pub final_reward: f32,
    /// Mean of `|summed reward|` over all completed iterations
    pub mean_abs_reward: f32,
    /// Mean `|avg_rate - target_rate|` over output neurons
    pub rate_error: f32,
    /// Running average output rates
    pub avg_rates: Vec<f32>,
    /// Target output rates
    pub target_rates: Vec<f32>,
    /// Mean connection weight
    pub mean_weight: f32,
    /// Total spikes per layer
    pub spike_counts: BTreeMap<String, usize>,
}

/// One JSON line of the `--plot` stream
#[derive(Debug, Serialize)]
struct PlotSnapshot<'a> {
    iteration: usize,
    spike_record: BTreeMap<&'a str, Vec<Vec<f32>>>,
    avg_rates: Vec<f32>,
    target_rates: Vec<f32>,
    weights: Vec<Vec<f32>>,
    abs_rewards: Vec<f32>,
}

/// Frequency-matching experiment state
///
/// The output rate estimate is the arithmetic mean over every completed
/// iteration, `avg += (rate - avg) / (i + 1)`, so the first sample keeps
/// its full weight rather than being replaced at the second iteration.
#[derive(Debug)]
pub struct FreqMatch {
    config: ExperimentConfig,
    ctx: SimulationContext,
    network: Network,
    loader: BernoulliLoader<StdRng>,
    learning: LearningContext,
    target_rates: Array1<f32>,
    avg_rates: Array1<f32>,
    rewards: Vec<f32>,
    spike_record: BTreeMap<&'static str, Array2<f32>>,
    spike_counts: BTreeMap<String, usize>,
    iteration: usize,
    plotted: usize,
}

impl FreqMatch {
    /// Build the network and draw weights, data and targets from `config.seed`
    pub fn new(config: ExperimentConfig) -> CliResult<Self> {
        config.validate()?;
        let n = config.n;
        let mut ctx = SimulationContext::new(config.seed);

        let mut network = Network::default();
        network.add_layer(INPUT_LAYER, InputNodes::new(n, config.input.clone())?)?;
        network.add_layer(OUTPUT_LAYER, LifNodes::new(n, config.lif.clone())?)?;

        let rule = MstdpEt::new(config.learning.rule.clone())?;
        let connection = Connection::random(n, n, 0.0, config.init_scale, config.connection.clone(), ctx.rng())?
            .with_rule(rule);
        network.add_connection(INPUT_LAYER, OUTPUT_LAYER, connection)?;

        for layer in [INPUT_LAYER, OUTPUT_LAYER] {
            let monitor = Monitor::layer(layer, [StateVariable::Spikes], config.encoder.time)?;
            network.add_monitor(layer, monitor)?;
        }

        let data = Array2::from_shape_fn((config.iterations, n), |_| ctx.rng().gen::<f32>());
        let loader = config.encoder.clone().loader(data, ctx.fork_rng())?;

        let task = &config.task;
        let target_rates = Array1::from_shape_fn(n, |_| task.target_base + task.target_spread * ctx.rng().gen::<f32>());

        let learning = LearningContext::new(0.0f32, config.learning.a_plus, config.learning.a_minus)?;
        let spike_record = [INPUT_LAYER, OUTPUT_LAYER]
            .into_iter()
            .map(|layer| (layer, Array2::zeros((config.plot_interval, n))))
            .collect();

        info!(
            "Built frequency-matching network: {} -> {} with {} units, seed {}",
            INPUT_LAYER, OUTPUT_LAYER, n, config.seed
        );

        Ok(Self {
            avg_rates: Array1::zeros(n),
            config,
            ctx,
            network,
            loader,
            learning,
            target_rates,
            rewards: Vec::new(),
            spike_record,
            spike_counts: BTreeMap::new(),
            iteration: 0,
            plotted: 0,
        })
    }

    /// Token that stops [`FreqMatch::run`] between iterations
    pub fn cancel_token(&self) -> CancelToken {
        self.ctx.cancel_token()
    }

    /// Completed iterations
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Target output rates
    pub fn target_rates(&self) -> &Array1<f32> {
        &self.target_rates
    }

    /// The simulated network
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Run one iteration and return its summed reward, or `None` if cancelled
    pub fn step(&mut self) -> CliResult<Option<f32>> {
        let spikes = self
            .loader
            .next()
            .ok_or_else(|| CliError::config("encoder produced no input"))?;
        let mut inputs = Inputs::new();
        inputs.insert(INPUT_LAYER.to_string(), spikes);

        let cancel = self.ctx.cancel_token();
        let time = self.config.encoder.time;
        let summary = self.network.run_cancellable(&inputs, time, &self.learning, &cancel)?;
        if summary.cancelled {
            return Ok(None);
        }
        for (layer, count) in summary.spike_counts {
            *self.spike_counts.entry(layer).or_insert(0) += count;
        }

        let i = self.iteration;
        let slot = i % self.config.plot_interval;
        let mut output_rates = Array1::zeros(self.config.n);
        for (&layer, record) in self.spike_record.iter_mut() {
            let rates = layer_rates(&self.network, layer)?;
            record.row_mut(slot).assign(&rates);
            if layer == OUTPUT_LAYER {
                output_rates = rates;
            }
        }

        // Running mean over every iteration so far
        let delta = (&output_rates - &self.avg_rates) / (i + 1) as f32;
        self.avg_rates += &delta;

        let reward = -(&self.avg_rates - &self.target_rates);
        let total = reward.sum();
        self.learning.reward = Reward::PerTarget(reward);
        self.rewards.push(total);

        if i % self.config.print_interval == 0 {
            info!("Averaged reward (iteration {}): {:.6}", i, total);
        }

        self.network.reset_monitors();
        self.iteration += 1;
        Ok(Some(total))
    }

    /// Run until `config.iterations` or cancellation
    ///
    /// `on_iteration` is called after every completed iteration; `plot`
    /// receives a JSON line every `plot_interval` iterations (and after the
    /// first one).
    pub fn run(
        &mut self,
        mut plot: Option<&mut dyn Write>,
        mut on_iteration: impl FnMut(usize),
    ) -> CliResult<FreqMatchReport> {
        while self.iteration < self.config.iterations {
            if self.ctx.is_cancelled() || self.step()?.is_none() {
                info!("Cancelled after {} iterations", self.iteration);
                break;
            }
            let i = self.iteration - 1;
            if let Some(out) = plot.as_deref_mut() {
                if i == 0 || i % self.config.plot_interval == 0 {
                    self.write_snapshot(out, i)?;
                }
            }
            on_iteration(self.iteration);
        }
        Ok(self.report())
    }

    /// Summary of the iterations completed so far
    pub fn report(&self) -> FreqMatchReport {
        let completed = self.rewards.len();
        let mean_abs_reward = if completed == 0 {
            0.0
        } else {
            self.rewards.iter().map(|r| r.abs()).sum::<f32>() / completed as f32
        };
        let rate_error = (&self.avg_rates - &self.target_rates)
            .mapv(f32::abs)
            .mean()
            .unwrap_or(0.0);
        let mean_weight = self
            .network
            .connection(INPUT_LAYER, OUTPUT_LAYER)
            .map(|connection| connection.mean_weight())
            .unwrap_or(0.0);

        FreqMatchReport {
            seed: self.config.seed,
            n: self.config.n,
            iterations: self.config.iterations,
            completed,
            cancelled: completed < self.config.iterations,
            final_reward: self.rewards.last().copied().unwrap_or(0.0),
            mean_abs_reward,
            rate_error,
            avg_rates: self.avg_rates.to_vec(),
            target_rates: self.target_rates.to_vec(),
            mean_weight,
            spike_counts: self.spike_counts.clone(),
        }
    }

    fn write_snapshot(&mut self, out: &mut dyn Write, iteration: usize) -> CliResult<()> {
        let weights = self.network.connection(INPUT_LAYER, OUTPUT_LAYER)?.weights();
        let snapshot = PlotSnapshot {
            iteration,
            spike_record: self
                .spike_record
                .iter()
                .map(|(&layer, record)| (layer, to_rows(record.view())))
                .collect(),
            avg_rates: self.avg_rates.to_vec(),
            target_rates: self.target_rates.to_vec(),
            weights: to_rows(weights.view()),
            abs_rewards: self.rewards[self.plotted..].iter().map(|r| r.abs()).collect(),
        };
        serde_json::to_writer(&mut *out, &snapshot)?;
        writeln!(out)?;
        self.plotted = self.rewards.len();
        debug!("Wrote plot snapshot for iteration {}", iteration);
        Ok(())
    }
}

/// Per-unit spike rate of `layer` over the monitored window
fn layer_rates(network: &Network, layer: &str) -> CliResult<Array1<f32>> {
    let spikes = network.monitor(layer)?.get(StateVariable::Spikes)?;
    spikes
        .mean_axis(Axis(0))
        .ok_or_else(|| CliError::config(format!("empty spike monitor for layer {}", layer)))
}

fn to_rows(array: ArrayView2<'_, f32>) -> Vec<Vec<f32>> {
    array.outer_iter().map(|row| row.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(iterations: usize) -> ExperimentConfig {
        ExperimentConfig {
            n: 8,
            iterations,
            plot_interval: 5,
            print_interval: 10,
            seed: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_report_after_run() {
        let mut experiment = FreqMatch::new(small_config(20)).unwrap();
        let mut seen = Vec::new();
        let report = experiment.run(None, |i| seen.push(i)).unwrap();

        assert_eq!(report.completed, 20);
        assert!(!report.cancelled);
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
        assert_eq!(report.avg_rates.len(), 8);
        assert!(report.target_rates.iter().all(|&r| (0.02..=0.07).contains(&r)));
        assert!((0.0..=1.25).contains(&report.mean_weight));
    }

    #[test]
    fn test_same_seed_same_report() {
        let a = FreqMatch::new(small_config(30)).unwrap().run(None, |_| {}).unwrap();
        let b = FreqMatch::new(small_config(30)).unwrap().run(None, |_| {}).unwrap();
        assert_eq!(a.avg_rates, b.avg_rates);
        assert_eq!(a.final_reward, b.final_reward);
        assert_eq!(a.mean_weight, b.mean_weight);
    }

    #[test]
    fn test_running_average_matches_mean() {
        let mut experiment = FreqMatch::new(small_config(12)).unwrap();
        for _ in 0..12 {
            experiment.step().unwrap();
            // Monitors are reset at the end of each step
            let rates = layer_rates(&experiment.network, OUTPUT_LAYER).unwrap();
            assert!(rates.iter().all(|&r| r == 0.0));
        }
        assert_eq!(experiment.iteration(), 12);

        // One timestep per iteration: summed average rate = output spikes / iterations
        let report = experiment.report();
        let output_spikes = report.spike_counts[OUTPUT_LAYER] as f32;
        assert!((experiment.avg_rates.sum() - output_spikes / 12.0).abs() < 1e-4);

        // Rewards follow -(avg - target)
        let expected = -(&experiment.avg_rates - experiment.target_rates()).sum();
        assert!((report.final_reward - expected).abs() < 1e-6);
    }

    #[test]
    fn test_cancel_stops_between_iterations() {
        let mut experiment = FreqMatch::new(small_config(50)).unwrap();
        let token = experiment.cancel_token();
        let report = experiment
            .run(None, |i| {
                if i == 7 {
                    token.cancel();
                }
            })
            .unwrap();
        assert_eq!(report.completed, 7);
        assert!(report.cancelled);
    }

    #[test]
    fn test_plot_snapshots_written() {
        let mut experiment = FreqMatch::new(small_config(11)).unwrap();
        let mut buffer: Vec<u8> = Vec::new();
        experiment.run(Some(&mut buffer), |_| {}).unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(buffer)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        // Iterations 0, 5 and 10
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1]["iteration"], 5);
        assert_eq!(lines[1]["spike_record"]["Y"].as_array().unwrap().len(), 5);
        assert_eq!(lines[1]["abs_rewards"].as_array().unwrap().len(), 5);
        assert_eq!(lines[2]["weights"].as_array().unwrap().len(), 8);
    }
}
