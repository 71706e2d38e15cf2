//! Read-only views of the simulation published after every tick
//!
//! A [`SimSnapshot`] is a fully owned copy, so readers holding one never see
//! a tick half applied.

use std::collections::BTreeMap;

use serde::Serialize;

use super::analytics::AnalyticsSummary;
use super::config::SimConfig;
use super::incident::Incident;
use super::road_network::{RoadEdge, RoadNetwork, RoadNode};
use super::traffic_light::TrafficLight;
use super::types::{
    ControlMode, EdgeId, GeoPoint, NodeId, RoutingAlgorithm, VehicleId, VehicleKind, VehicleStatus,
};
use super::vehicle::Vehicle;
use super::world::SimWorld;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphView {
    pub nodes: Vec<RoadNode>,
    pub edges: Vec<RoadEdge>,
}

impl GraphView {
    pub fn capture(network: &RoadNetwork) -> Self {
        Self {
            nodes: network.nodes().cloned().collect(),
            edges: network.edges().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleView {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub status: VehicleStatus,
    pub origin: NodeId,
    pub destination: NodeId,
    pub current_node: NodeId,
    pub current_edge: Option<EdgeId>,
    pub position: GeoPoint,
    pub speed_kph: f64,
    /// Current position followed by every node still ahead
    pub route: Vec<GeoPoint>,
    pub route_progress: usize,
    pub edge_progress: f64,
    pub eta: f64,
    pub reroute_count: u32,
}

impl VehicleView {
    pub fn capture(vehicle: &Vehicle, network: &RoadNetwork) -> Self {
        let ahead = vehicle
            .route_nodes
            .iter()
            .skip(vehicle.route_progress + 1)
            .filter_map(|node| network.position(*node));
        let route = std::iter::once(vehicle.position).chain(ahead).collect();

        Self {
            id: vehicle.id,
            kind: vehicle.kind,
            status: vehicle.status,
            origin: vehicle.origin,
            destination: vehicle.destination,
            current_node: vehicle.current_node,
            current_edge: vehicle.current_edge(),
            position: vehicle.position,
            speed_kph: vehicle.speed_kph,
            route,
            route_progress: vehicle.route_progress,
            edge_progress: vehicle.edge_progress,
            eta: vehicle.eta,
            reroute_count: vehicle.reroute_count,
        }
    }
}

/// Settings as currently applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettingsView {
    pub speed_multiplier: f64,
    pub routing_algorithm: RoutingAlgorithm,
    pub signal_mode: ControlMode,
}

impl Default for SettingsView {
    fn default() -> Self {
        let config = SimConfig::default();
        Self {
            speed_multiplier: config.speed_multiplier,
            routing_algorithm: config.routing_algorithm,
            signal_mode: config.signal_mode,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimSnapshot {
    pub tick: u64,
    pub time: f64,
    pub running: bool,
    pub settings: SettingsView,
    pub graph: GraphView,
    pub lights: Vec<TrafficLight>,
    pub vehicles: Vec<VehicleView>,
    pub incidents: Vec<Incident>,
    pub congestion: BTreeMap<EdgeId, f64>,
    pub analytics: AnalyticsSummary,
}

impl SimSnapshot {
    pub fn capture(world: &SimWorld) -> Self {
        let network = world.network();
        let config = world.config();
        Self {
            tick: world.tick_count(),
            time: world.time(),
            running: world.is_running(),
            settings: SettingsView {
                speed_multiplier: config.speed_multiplier,
                routing_algorithm: config.routing_algorithm,
                signal_mode: world.signals().mode(),
            },
            graph: GraphView::capture(network),
            lights: world.signals().lights().to_vec(),
            vehicles: world
                .fleet()
                .vehicles()
                .map(|vehicle| VehicleView::capture(vehicle, network))
                .collect(),
            incidents: world.incidents().incidents().cloned().collect(),
            congestion: network.congestion_map(),
            analytics: world.analytics().latest().clone(),
        }
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleView> {
        self.vehicles.iter().find(|vehicle| vehicle.id == id)
    }

    pub fn light_at(&self, node: NodeId) -> Option<&TrafficLight> {
        self.lights.iter().find(|light| light.node == node)
    }
}
