//! Periodic statistics over the whole simulation

use std::collections::VecDeque;

use serde::Serialize;

use super::fleet::FleetManager;
use super::incident::IncidentManager;
use super::road_network::RoadNetwork;
use super::signals::SignalController;
use super::types::VehicleStatus;

/// Congestion samples kept for the trend
pub const TREND_WINDOW: usize = 60;

/// Statistics computed at the last analytics pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsSummary {
    /// Simulated time of the pass
    pub time: f64,
    pub active_vehicles: usize,
    pub moving_vehicles: usize,
    pub stuck_vehicles: usize,
    /// Mean current speed over moving vehicles (km/h)
    pub average_speed_kph: f64,
    pub average_congestion: f64,
    /// Change in average congestion across the sample window
    pub congestion_trend: f64,
    pub signal_efficiency: f64,
    pub active_incidents: usize,
    pub total_incidents: u64,
    pub total_reroutes: u64,
    pub vehicles_spawned: u64,
    pub vehicles_completed: u64,
    /// Completed trips as a share of spawned vehicles
    pub success_rate: f64,
    /// Mean duration of completed trips (seconds)
    pub average_trip_time: f64,
    /// Delay vehicles had accumulated when they were rerouted (seconds)
    pub total_reroute_delay: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Analytics {
    congestion_history: VecDeque<f64>,
    latest: AnalyticsSummary,
}

impl Analytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> &AnalyticsSummary {
        &self.latest
    }

    /// Average congestion samples, oldest first
    pub fn congestion_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.congestion_history.iter().copied()
    }

    /// Recompute the summary from the current simulation state
    pub fn record(
        &mut self,
        now: f64,
        network: &RoadNetwork,
        fleet: &FleetManager,
        signals: &SignalController,
        incidents: &IncidentManager,
    ) -> &AnalyticsSummary {
        let average_congestion = network.average_congestion();
        if self.congestion_history.len() == TREND_WINDOW {
            self.congestion_history.pop_front();
        }
        self.congestion_history.push_back(average_congestion);

        let congestion_trend = match (self.congestion_history.front(), self.congestion_history.back()) {
            (Some(oldest), Some(newest)) => newest - oldest,
            _ => 0.0,
        };

        let speeds: Vec<f64> = fleet
            .vehicles()
            .filter(|vehicle| vehicle.status == VehicleStatus::Moving)
            .map(|vehicle| vehicle.speed_kph)
            .collect();
        let average_speed_kph = if speeds.is_empty() {
            0.0
        } else {
            speeds.iter().sum::<f64>() / speeds.len() as f64
        };

        let stats = fleet.stats();
        let success_rate = if stats.spawned > 0 {
            stats.completed as f64 / stats.spawned as f64
        } else {
            0.0
        };
        let average_trip_time = if stats.completed > 0 {
            stats.completed_trip_time / stats.completed as f64
        } else {
            0.0
        };

        self.latest = AnalyticsSummary {
            time: now,
            active_vehicles: fleet.len(),
            moving_vehicles: speeds.len(),
            stuck_vehicles: fleet.count_with_status(VehicleStatus::Stuck),
            average_speed_kph,
            average_congestion,
            congestion_trend,
            signal_efficiency: signals.efficiency(),
            active_incidents: incidents.len(),
            total_incidents: incidents.injected(),
            total_reroutes: stats.reroutes,
            vehicles_spawned: stats.spawned,
            vehicles_completed: stats.completed,
            success_rate,
            average_trip_time,
            total_reroute_delay: stats.reroute_delay,
        };
        &self.latest
    }
}
