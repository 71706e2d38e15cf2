//! Simulation parameters
//!
//! Everything tunable lives here so the binary (and tests) can build a
//! [`SimConfig`] and hand it to [`SimWorld`](super::SimWorld).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{SimError, SimResult};
use super::types::{ControlMode, RoutingAlgorithm};

/// Default vehicle spawn rate in vehicles per simulated second
pub const DEFAULT_SPAWN_RATE: f64 = 0.2;
/// Default ceiling on concurrently active vehicles
pub const DEFAULT_MAX_VEHICLES: usize = 50;
/// Default probability of a random incident per simulated second
pub const DEFAULT_INCIDENT_PROBABILITY: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Vehicles spawned per simulated second
    pub spawn_rate: f64,
    pub max_vehicles: usize,
    /// Random incidents per simulated second
    pub incident_probability: f64,
    /// Multiplies every tick delta
    pub speed_multiplier: f64,
    pub routing_algorithm: RoutingAlgorithm,
    pub signal_mode: ControlMode,
    /// Simulated seconds between analytics recomputations
    pub analytics_interval: f64,
    /// Simulated seconds between value-iteration passes
    pub optimization_interval: f64,
    /// Simulated seconds a manual override holds a light
    pub manual_window: f64,
    /// Simulated seconds between retries for stuck vehicles
    pub stuck_retry_interval: f64,
    /// Upcoming route edges inspected when rerouting around an incident
    pub reroute_lookahead: usize,
    /// Node expansions allowed per path search
    pub max_search_expansions: usize,
    /// Wall-clock cadence of the background runner
    pub tick_interval: Duration,
    /// Seed for reproducible runs; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            spawn_rate: DEFAULT_SPAWN_RATE,
            max_vehicles: DEFAULT_MAX_VEHICLES,
            incident_probability: DEFAULT_INCIDENT_PROBABILITY,
            speed_multiplier: 1.0,
            routing_algorithm: RoutingAlgorithm::AStar,
            signal_mode: ControlMode::Auto,
            analytics_interval: 5.0,
            optimization_interval: 60.0,
            manual_window: 60.0,
            stuck_retry_interval: 30.0,
            reroute_lookahead: 3,
            max_search_expansions: 100_000,
            tick_interval: Duration::from_millis(100),
            seed: None,
        }
    }
}

impl SimConfig {
    /// Config with a fixed seed and no background traffic or incidents,
    /// handy for scripted scenarios
    pub fn quiet(seed: u64) -> Self {
        Self {
            spawn_rate: 0.0,
            incident_probability: 0.0,
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        let non_negative = [
            ("spawn_rate", self.spawn_rate),
            ("incident_probability", self.incident_probability),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidArgument(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        let positive = [
            ("speed_multiplier", self.speed_multiplier),
            ("analytics_interval", self.analytics_interval),
            ("optimization_interval", self.optimization_interval),
            ("manual_window", self.manual_window),
            ("stuck_retry_interval", self.stuck_retry_interval),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SimError::InvalidArgument(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        if self.max_search_expansions == 0 {
            return Err(SimError::InvalidArgument(
                "max_search_expansions must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
