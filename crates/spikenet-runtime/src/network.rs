//! Network orchestration: named layers, connections and monitors driven
//! through the per-timestep simulation loop

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, Array2, ArrayView1};

use crate::{
    connection::Connection,
    error::*,
    monitor::{Monitor, MonitorTarget, Monitorable},
    neuron::{Layer, LayerKind},
    plasticity::LearningContext,
    simulation::{CancelToken, RunSummary},
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Network configuration parameters
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct NetworkConfig {
    /// Apply connection learning rules during `run`
    pub learning: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { learning: true }
    }
}

/// Lifecycle phase of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Layers, connections and monitors may be added
    Building,
    /// Structure is frozen; `run` may be called repeatedly
    Running,
}

/// Per-timestep input spikes, keyed by layer name, each of shape `(duration, N)`
pub type Inputs = HashMap<String, Array2<bool>>;

#[derive(Debug)]
struct Edge {
    source: usize,
    target: usize,
    connection: Connection,
}

#[derive(Debug, Clone, Copy)]
enum Tap {
    Layer(usize),
    Connection(usize),
}

#[derive(Debug)]
struct MonitorSlot {
    name: String,
    tap: Tap,
    monitor: Monitor,
}

/// What drives a layer during phase (a) of a timestep
enum Drive<'a> {
    Spikes(ArrayView1<'a, bool>),
    Current(Array1<f32>),
}

/// Spiking neural network of named populations
///
/// Built with [`Network::add_layer`], [`Network::add_connection`] and
/// [`Network::add_monitor`], then driven with [`Network::run`]. The first
/// `run` freezes the structure.
///
/// Each timestep runs three phases separated by barriers:
///
/// 1. connection currents are computed from the previous timestep's spikes
///    and every layer steps;
/// 2. every connection applies its learning rule;
/// 3. every monitor records.
#[derive(Debug)]
pub struct Network {
    /// Network configuration
    pub config: NetworkConfig,
    phase: Phase,
    names: Vec<String>,
    layers: Vec<Layer>,
    layer_index: HashMap<String, usize>,
    edges: Vec<Edge>,
    edge_index: HashMap<(String, String), usize>,
    monitors: Vec<MonitorSlot>,
    monitor_index: HashMap<String, usize>,
    timestep: usize,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl Network {
    /// Create an empty network
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            phase: Phase::Building,
            names: Vec::new(),
            layers: Vec::new(),
            layer_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            monitors: Vec::new(),
            monitor_index: HashMap::new(),
            timestep: 0,
        }
    }

    /// Register a population under `name`
    pub fn add_layer(&mut self, name: impl Into<String>, layer: impl Into<Layer>) -> Result<()> {
        self.ensure_building("add layer")?;
        let name = name.into();
        if self.layer_index.contains_key(&name) {
            return Err(RuntimeError::duplicate("layer", name));
        }

        let layer = layer.into();
        log::info!("Added {:?} layer '{}' with {} units", layer.kind(), name, layer.len());
        self.layer_index.insert(name.clone(), self.layers.len());
        self.names.push(name);
        self.layers.push(layer);
        Ok(())
    }

    /// Connect `source` to `target`
    ///
    /// The weight matrix must be `(len(source), len(target))`; Input layers
    /// cannot be targets.
    pub fn add_connection(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        connection: Connection,
    ) -> Result<()> {
        self.ensure_building("add connection")?;
        let (source, target) = (source.into(), target.into());
        let key = (source.clone(), target.clone());
        if self.edge_index.contains_key(&key) {
            return Err(RuntimeError::duplicate("connection", format!("{}->{}", source, target)));
        }

        let src = self.index_of(&source)?;
        let tgt = self.index_of(&target)?;
        if self.layers[tgt].kind() == LayerKind::Input {
            return Err(RuntimeError::invalid_topology(format!(
                "connection {}->{} targets Input layer '{}'",
                source, target, target
            )));
        }

        let expected = [self.layers[src].len(), self.layers[tgt].len()];
        let (rows, cols) = connection.shape();
        if [rows, cols] != expected {
            return Err(RuntimeError::shape_mismatch(
                format!("connection {}->{} weights", source, target),
                expected,
                [rows, cols],
            ));
        }

        log::info!(
            "Added connection {}->{} ({}x{}, rule: {})",
            source,
            target,
            rows,
            cols,
            connection.rule().map_or("none", |rule| rule.name())
        );
        self.edge_index.insert(key, self.edges.len());
        self.edges.push(Edge {
            source: src,
            target: tgt,
            connection,
        });
        Ok(())
    }

    /// Attach `monitor` under `name`; its buffers are sized here
    pub fn add_monitor(&mut self, name: impl Into<String>, mut monitor: Monitor) -> Result<()> {
        self.ensure_building("add monitor")?;
        let name = name.into();
        if self.monitor_index.contains_key(&name) {
            return Err(RuntimeError::duplicate("monitor", name));
        }

        let tap = match monitor.target() {
            MonitorTarget::Layer(layer) => Tap::Layer(self.index_of(layer)?),
            MonitorTarget::Connection { source, target } => {
                let key = (source.clone(), target.clone());
                let edge = self
                    .edge_index
                    .get(&key)
                    .copied()
                    .ok_or_else(|| RuntimeError::unknown("connection", format!("{}->{}", source, target)))?;
                Tap::Connection(edge)
            }
        };
        monitor.bind(self.monitorable(tap))?;

        log::info!("Added monitor '{}' on {} {:?}", name, monitor.target(), monitor.variables());
        self.monitor_index.insert(name.clone(), self.monitors.len());
        self.monitors.push(MonitorSlot { name, tap, monitor });
        Ok(())
    }

    /// Simulate `duration` timesteps
    ///
    /// `inputs` maps layer names to `(duration, N)` spike tensors (extra
    /// rows are ignored). Every Input layer must be present; an LIF layer
    /// named in `inputs` receives its spikes as unit currents on top of its
    /// connection currents. All inputs are validated before any state
    /// changes.
    pub fn run(&mut self, inputs: &Inputs, duration: usize, learning: &LearningContext) -> Result<RunSummary> {
        self.run_cancellable(inputs, duration, learning, &CancelToken::new())
    }

    /// Like [`Network::run`], checking `cancel` between timesteps
    ///
    /// On cancellation every completed timestep is kept and the summary
    /// reports the number of steps executed.
    pub fn run_cancellable(
        &mut self,
        inputs: &Inputs,
        duration: usize,
        learning: &LearningContext,
        cancel: &CancelToken,
    ) -> Result<RunSummary> {
        let drives = self.validate_inputs(inputs, duration)?;
        let learn = self.config.learning;
        if learn {
            self.validate_reward(learning)?;
        }

        if self.phase == Phase::Building {
            log::debug!(
                "Freezing network: {} layers, {} connections, {} monitors",
                self.layers.len(),
                self.edges.len(),
                self.monitors.len()
            );
            self.phase = Phase::Running;
        }
        log::debug!("Running {} timesteps (learning: {})", duration, learn);

        let mut counts = vec![0usize; self.layers.len()];
        let mut summary = RunSummary::default();

        for t in 0..duration {
            if cancel.is_cancelled() {
                log::debug!("Run cancelled after {} of {} timesteps", t, duration);
                summary.cancelled = true;
                break;
            }

            self.step_layers(&drives, t)?;
            if learn {
                self.update_connections(learning)?;
            }
            self.record_monitors(t);

            for (count, layer) in counts.iter_mut().zip(&self.layers) {
                *count += layer.spike_count();
            }
            self.timestep += 1;
            summary.steps += 1;
            log::trace!("Timestep {} complete", self.timestep);
        }

        summary.spike_counts = self.names.iter().cloned().zip(counts).collect::<BTreeMap<_, _>>();
        Ok(summary)
    }

    /// Phase (a): deliver inputs and connection currents, step every layer
    fn step_layers(&mut self, inputs: &[Option<&Array2<bool>>], t: usize) -> Result<()> {
        let layers = &self.layers;

        // Currents read last timestep's spikes, so all of them are computed
        // before any layer steps.
        #[cfg(feature = "parallel")]
        let currents: Result<Vec<(usize, Array1<f32>)>> = self
            .edges
            .par_iter()
            .map(|edge| {
                let current = edge.connection.compute_input(&layers[edge.source]);
                current.map(|current| (edge.target, current))
            })
            .collect();

        #[cfg(not(feature = "parallel"))]
        let currents: Result<Vec<(usize, Array1<f32>)>> = self
            .edges
            .iter()
            .map(|edge| {
                let current = edge.connection.compute_input(&layers[edge.source]);
                current.map(|current| (edge.target, current))
            })
            .collect();

        let mut summed: Vec<Option<Array1<f32>>> = vec![None; layers.len()];
        for (target, current) in currents? {
            match &mut summed[target] {
                Some(total) => *total += &current,
                slot => *slot = Some(current),
            }
        }

        let drives: Vec<Drive<'_>> = layers
            .iter()
            .zip(inputs)
            .zip(summed)
            .map(|((layer, input), current)| {
                let row = input.map(|spikes| spikes.row(t));
                match (layer.kind(), row) {
                    (LayerKind::Input, Some(row)) => Drive::Spikes(row),
                    (LayerKind::Input, None) => Drive::Current(Array1::zeros(0)),
                    (LayerKind::Lif, row) => {
                        let mut current = current.unwrap_or_else(|| Array1::zeros(layer.len()));
                        if let Some(row) = row {
                            current += &row.mapv(f32::from);
                        }
                        Drive::Current(current)
                    }
                }
            })
            .collect();

        #[cfg(feature = "parallel")]
        let stepped = self
            .layers
            .par_iter_mut()
            .zip(drives.into_par_iter())
            .try_for_each(|(layer, drive)| step_layer(layer, drive));

        #[cfg(not(feature = "parallel"))]
        let stepped = self
            .layers
            .iter_mut()
            .zip(drives)
            .try_for_each(|(layer, drive)| step_layer(layer, drive));

        stepped
    }

    /// Phase (b): every connection applies its learning rule
    fn update_connections(&mut self, learning: &LearningContext) -> Result<()> {
        let layers = &self.layers;

        #[cfg(feature = "parallel")]
        let updated = self
            .edges
            .par_iter_mut()
            .try_for_each(|edge| edge.connection.update(&layers[edge.source], &layers[edge.target], learning));

        #[cfg(not(feature = "parallel"))]
        let updated = self
            .edges
            .iter_mut()
            .try_for_each(|edge| edge.connection.update(&layers[edge.source], &layers[edge.target], learning));

        updated
    }

    /// Phase (c): every monitor records timestep `t`
    fn record_monitors(&mut self, t: usize) {
        let (layers, edges) = (&self.layers, &self.edges);
        for slot in &mut self.monitors {
            let source: &dyn Monitorable = match slot.tap {
                Tap::Layer(i) => &layers[i],
                Tap::Connection(i) => &edges[i].connection,
            };
            slot.monitor.record(t, source);
        }
    }

    fn validate_inputs<'a>(&self, inputs: &'a Inputs, duration: usize) -> Result<Vec<Option<&'a Array2<bool>>>> {
        let mut resolved = vec![None; self.layers.len()];

        // Sorted for a deterministic first error
        let mut names: Vec<&String> = inputs.keys().collect();
        names.sort();
        for name in names {
            let index = self.index_of(name)?;
            let spikes = &inputs[name];
            let width = self.layers[index].len();
            let (rows, cols) = spikes.dim();
            if cols != width || rows < duration {
                return Err(RuntimeError::shape_mismatch(
                    format!("input for layer '{}'", name),
                    [duration, width],
                    [rows, cols],
                ));
            }
            resolved[index] = Some(spikes);
        }

        for (index, layer) in self.layers.iter().enumerate() {
            if layer.kind() == LayerKind::Input && resolved[index].is_none() {
                return Err(RuntimeError::missing_input(self.names[index].as_str()));
            }
        }
        Ok(resolved)
    }

    fn validate_reward(&self, learning: &LearningContext) -> Result<()> {
        for edge in self.edges.iter().filter(|edge| edge.connection.rule().is_some()) {
            learning.reward.check_target(self.layers[edge.target].len())?;
        }
        Ok(())
    }

    fn ensure_building(&self, operation: &'static str) -> Result<()> {
        match self.phase {
            Phase::Building => Ok(()),
            Phase::Running => Err(RuntimeError::NetworkFrozen { operation }),
        }
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.layer_index
            .get(name)
            .copied()
            .ok_or_else(|| RuntimeError::unknown("layer", name))
    }

    fn monitorable(&self, tap: Tap) -> &dyn Monitorable {
        match tap {
            Tap::Layer(i) => &self.layers[i],
            Tap::Connection(i) => &self.edges[i].connection,
        }
    }

    /// Enable or disable learning for subsequent runs
    pub fn set_learning(&mut self, learning: bool) {
        self.config.learning = learning;
    }

    /// Return every layer to rest and zero eligibility traces
    ///
    /// Weights, monitors and the timestep counter are kept.
    pub fn reset_state(&mut self) {
        for layer in &mut self.layers {
            layer.reset_state();
        }
        for edge in &mut self.edges {
            edge.connection.reset_state();
        }
    }

    /// Zero every monitor buffer
    pub fn reset_monitors(&mut self) {
        for slot in &mut self.monitors {
            slot.monitor.reset();
        }
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Timesteps simulated over all runs
    pub fn timestep(&self) -> usize {
        self.timestep
    }

    /// Layer names in registration order
    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Layer by name
    pub fn layer(&self, name: &str) -> Result<&Layer> {
        Ok(&self.layers[self.index_of(name)?])
    }

    /// Connection between two layers
    pub fn connection(&self, source: &str, target: &str) -> Result<&Connection> {
        let index = self.edge_position(source, target)?;
        Ok(&self.edges[index].connection)
    }

    /// Mutable connection, e.g. to overwrite weights between runs
    pub fn connection_mut(&mut self, source: &str, target: &str) -> Result<&mut Connection> {
        let index = self.edge_position(source, target)?;
        Ok(&mut self.edges[index].connection)
    }

    /// Connections as `(source, target, connection)` in registration order
    pub fn connections(&self) -> impl Iterator<Item = (&str, &str, &Connection)> {
        self.edges.iter().map(move |edge| {
            (
                self.names[edge.source].as_str(),
                self.names[edge.target].as_str(),
                &edge.connection,
            )
        })
    }

    /// Monitor by name
    pub fn monitor(&self, name: &str) -> Result<&Monitor> {
        self.monitor_index
            .get(name)
            .map(|&i| &self.monitors[i].monitor)
            .ok_or_else(|| RuntimeError::unknown("monitor", name))
    }

    /// Monitor names in registration order
    pub fn monitor_names(&self) -> impl Iterator<Item = &str> {
        self.monitors.iter().map(|slot| slot.name.as_str())
    }

    fn edge_position(&self, source: &str, target: &str) -> Result<usize> {
        self.edge_index
            .get(&(source.to_string(), target.to_string()))
            .copied()
            .ok_or_else(|| RuntimeError::unknown("connection", format!("{}->{}", source, target)))
    }
}

fn step_layer(layer: &mut Layer, drive: Drive<'_>) -> Result<()> {
    match (layer, drive) {
        (Layer::Input(nodes), Drive::Spikes(spikes)) => nodes.step(spikes),
        (Layer::Lif(nodes), Drive::Current(current)) => nodes.step(current.view()),
        // Validation guarantees every Input layer has spikes
        (layer, _) => Err(RuntimeError::missing_input(format!("{:?} layer", layer.kind()))),
    }
}
