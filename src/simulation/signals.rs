//! Signal subsystem: every traffic light plus the timing policies
//!
//! Lights in `Auto` mode get queue-heuristic durations every tick. Lights in
//! `Optimized` mode get value-iteration durations on a coarser interval.
//! Both policies leave the yellow phase at its fixed clearance length.

use std::collections::HashMap;

use log::debug;
use rand::Rng;
use serde::Serialize;

use super::error::{SimError, SimResult};
use super::road_network::RoadNetwork;
use super::traffic_light::{SignalTimings, StateValues, TrafficLight};
use super::types::{ControlMode, LightId, LightState, NodeId};

pub const GREEN_MIN: f64 = 15.0;
pub const GREEN_MAX: f64 = 45.0;
pub const RED_MIN: f64 = 15.0;
pub const RED_MAX: f64 = 60.0;
/// Red length the heuristic starts from before subtracting the queue
pub const RED_BASE: f64 = 40.0;

/// Queue-heuristic timings for a light with `queue` waiting vehicles
pub fn queue_heuristic_timings(queue: u32) -> SignalTimings {
    let q = queue as f64;
    let green = if queue > 10 {
        (GREEN_MIN + q).min(GREEN_MAX)
    } else if queue > 5 {
        (GREEN_MIN + q / 2.0).min(30.0)
    } else {
        GREEN_MIN
    };
    let red = (RED_BASE - q).max(RED_MIN);
    SignalTimings::new(red, green)
}

/// Bellman-update policy over the three light phases
///
/// Rewards: red costs one unit per queued vehicle, green earns a throughput
/// bonus minus a smaller queue penalty, yellow costs a small constant. The
/// advantage of green over red turns into longer green and shorter red.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueIteration {
    pub discount: f64,
    pub green_reward: f64,
    pub green_queue_penalty: f64,
    pub yellow_reward: f64,
    /// Seconds of green gained (and red lost) per unit of advantage
    pub seconds_per_value: f64,
    /// Share of red removed when every downstream light is green
    pub green_wave_factor: f64,
    pub max_sweeps: usize,
    pub tolerance: f64,
}

impl Default for ValueIteration {
    fn default() -> Self {
        Self {
            discount: 0.9,
            green_reward: 10.0,
            green_queue_penalty: 0.5,
            yellow_reward: -1.0,
            seconds_per_value: 0.5,
            green_wave_factor: 0.3,
            max_sweeps: 500,
            tolerance: 1e-6,
        }
    }
}

impl ValueIteration {
    pub fn reward(&self, state: LightState, queue: f64) -> f64 {
        match state {
            LightState::Red => -queue,
            LightState::Green => self.green_reward - self.green_queue_penalty * queue,
            LightState::Yellow => self.yellow_reward,
        }
    }

    /// Sweep `V(s) = R(s) + γ·V(next(s))` until the values settle
    ///
    /// `values` is used as the starting point, so repeated calls for the
    /// same light converge quickly.
    pub fn evaluate(&self, values: &mut StateValues, queue: u32) {
        let q = queue as f64;
        let states = [LightState::Red, LightState::Green, LightState::Yellow];
        for _ in 0..self.max_sweeps {
            let previous = *values;
            let mut delta: f64 = 0.0;
            for state in states {
                let updated = self.reward(state, q) + self.discount * previous.get(state.next());
                delta = delta.max((updated - previous.get(state)).abs());
                values.set(state, updated);
            }
            if delta < self.tolerance {
                break;
            }
        }
    }

    /// Durations derived from converged values
    ///
    /// `green_neighbors` of `neighbors` downstream lights are green; with no
    /// neighbors the green-wave adjustment is skipped.
    pub fn timings(&self, values: &StateValues, green_neighbors: usize, neighbors: usize) -> SignalTimings {
        let advantage = values.green - values.red;
        let green = (GREEN_MIN + advantage * self.seconds_per_value).clamp(GREEN_MIN, GREEN_MAX);
        let mut red = (RED_BASE - advantage * self.seconds_per_value).clamp(RED_MIN, RED_MAX);

        if neighbors > 0 {
            let share = green_neighbors as f64 / neighbors as f64;
            red = (red * (1.0 - self.green_wave_factor * share)).max(RED_MIN);
        }

        SignalTimings::new(red, green)
    }
}

/// What one signal update did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalUpdate {
    pub transitions: usize,
    pub optimized: usize,
}

#[derive(Debug, Clone)]
pub struct SignalController {
    lights: Vec<TrafficLight>,
    by_node: HashMap<NodeId, LightId>,
    mode: ControlMode,
    manual_window: f64,
    optimization_interval: f64,
    last_optimization: f64,
    policy: ValueIteration,
}

impl SignalController {
    /// Create one light for every intersection node
    pub fn new<R: Rng>(
        network: &RoadNetwork,
        rng: &mut R,
        mode: ControlMode,
        manual_window: f64,
        optimization_interval: f64,
        now: f64,
    ) -> Self {
        let mut lights = Vec::new();
        let mut by_node = HashMap::new();

        for node in network.nodes().filter(|node| node.is_intersection) {
            let id = LightId(lights.len());
            let timings = SignalTimings::new(
                rng.random_range(20..=40) as f64,
                rng.random_range(15..=30) as f64,
            );
            let mut light = TrafficLight::new(
                id,
                node.id,
                node.position,
                network.incoming_edges(node.id),
                network.outgoing_edges(node.id),
                timings,
                mode,
                now,
            );
            if mode == ControlMode::Manual {
                light.freeze();
            }
            by_node.insert(node.id, id);
            lights.push(light);
        }

        debug!("Created {} traffic lights", lights.len());

        Self {
            lights,
            by_node,
            mode,
            manual_window,
            optimization_interval,
            last_optimization: now,
            policy: ValueIteration::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn policy(&self) -> &ValueIteration {
        &self.policy
    }

    pub fn lights(&self) -> &[TrafficLight] {
        &self.lights
    }

    pub fn light(&self, id: LightId) -> Option<&TrafficLight> {
        self.lights.get(id.0)
    }

    pub fn light_at(&self, node: NodeId) -> Option<&TrafficLight> {
        self.by_node.get(&node).and_then(|id| self.lights.get(id.0))
    }

    /// Mode a light returns to after a manual override expires
    fn release_mode(&self) -> ControlMode {
        match self.mode {
            ControlMode::Optimized => ControlMode::Optimized,
            ControlMode::Auto | ControlMode::Manual => ControlMode::Auto,
        }
    }

    /// Manually force the light at `node` into `state`
    pub fn set_state(&mut self, node: NodeId, state: LightState, now: f64) -> SimResult<()> {
        let id = *self.by_node.get(&node).ok_or(SimError::LightNotFound(node))?;
        let window = self.manual_window;
        let light = &mut self.lights[id.0];
        light.set_state(state, now, window);
        if self.mode == ControlMode::Manual {
            light.freeze();
        }
        Ok(())
    }

    /// Switch every light to a new control mode
    ///
    /// Lights inside a manual override window keep it and pick up the new
    /// mode once the window ends.
    pub fn set_mode(&mut self, mode: ControlMode, now: f64) {
        self.mode = mode;
        for light in &mut self.lights {
            match mode {
                ControlMode::Manual => light.freeze(),
                ControlMode::Auto | ControlMode::Optimized if light.manual_until.is_some() => {}
                ControlMode::Auto | ControlMode::Optimized => light.release(mode, now),
            }
        }
        if mode == ControlMode::Optimized {
            // Run a pass at the next update rather than a full interval later.
            self.last_optimization = now - self.optimization_interval;
        }
    }

    pub fn set_manual_window(&mut self, window: f64) {
        self.manual_window = window;
    }

    /// Refresh queues, advance due phases, then re-time lights
    pub fn update(&mut self, network: &RoadNetwork, now: f64) -> SignalUpdate {
        let release_to = self.release_mode();
        let mut summary = SignalUpdate::default();

        for light in &mut self.lights {
            light.queue_length = light
                .incoming_edges
                .iter()
                .filter_map(|edge| network.edge(*edge))
                .map(|edge| edge.vehicle_count)
                .sum();

            if light.update(now, release_to) {
                summary.transitions += 1;
            }

            if light.control_mode == ControlMode::Auto {
                light.set_timings(queue_heuristic_timings(light.queue_length));
            }
        }

        if now - self.last_optimization >= self.optimization_interval {
            summary.optimized = self.optimize(network);
            self.last_optimization = now;
        }

        summary
    }

    /// One value-iteration pass over every optimized light
    ///
    /// Lights with an empty queue keep their durations.
    pub fn optimize(&mut self, network: &RoadNetwork) -> usize {
        let states: Vec<LightState> = self.lights.iter().map(|light| light.state).collect();
        let mut optimized = 0;

        for light in &mut self.lights {
            if light.control_mode != ControlMode::Optimized || light.queue_length == 0 {
                continue;
            }

            let mut neighbors = 0;
            let mut green_neighbors = 0;
            for edge in &light.outgoing_edges {
                let Some(target) = network.edge(*edge).map(|edge| edge.target) else {
                    continue;
                };
                let Some(neighbor) = self.by_node.get(&target) else {
                    continue;
                };
                if *neighbor == light.id {
                    continue;
                }
                neighbors += 1;
                if states[neighbor.0] == LightState::Green {
                    green_neighbors += 1;
                }
            }

            self.policy.evaluate(&mut light.values, light.queue_length);
            let timings = self.policy.timings(&light.values, green_neighbors, neighbors);
            light.set_timings(timings);
            optimized += 1;
        }

        optimized
    }

    /// Share of queued vehicles currently facing a green light (1.0 with no queue)
    pub fn efficiency(&self) -> f64 {
        let total: u32 = self.lights.iter().map(|light| light.queue_length).sum();
        if total == 0 {
            return 1.0;
        }
        let served: u32 = self
            .lights
            .iter()
            .filter(|light| light.state == LightState::Green)
            .map(|light| light.queue_length)
            .sum();
        served as f64 / total as f64
    }
}
