//! Vehicle movement logic for the traffic simulation

use serde::Serialize;

use super::error::{SimError, SimResult};
use super::road_network::RoadNetwork;
use super::router::Route;
use super::types::{EdgeId, GeoPoint, NodeId, VehicleId, VehicleKind, VehicleStatus};

/// Share of base speed lost on a fully congested edge
pub const CONGESTION_SPEED_PENALTY: f64 = 0.8;

/// Lowest reported speed (km/h)
pub const MIN_SPEED_KPH: f64 = 1.0;

/// Slack when deciding whether the remaining tick time finishes an edge
const CROSSING_EPSILON: f64 = 1e-9;

/// Result of a vehicle update indicating what the fleet should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdate {
    /// Not moving this tick (stuck, waiting)
    Idle,
    Moved,
    Arrived,
}

/// A vehicle in the traffic simulation
#[derive(Debug, Clone, Serialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub origin: NodeId,
    pub destination: NodeId,
    pub current_node: NodeId,
    pub position: GeoPoint,
    /// Nodes of the active route, `route_nodes[route_progress]` is the
    /// start of the current edge
    pub route_nodes: Vec<NodeId>,
    pub route: Vec<EdgeId>,
    pub route_progress: usize,
    /// Fraction of the current edge already covered
    pub edge_progress: f64,
    pub status: VehicleStatus,
    pub base_speed_kph: f64,
    pub speed_kph: f64,
    pub reroute_count: u32,
    /// Estimated arrival, simulated seconds
    pub eta: f64,
    pub departed_at: f64,
    /// Free-flow time worth of road covered so far
    pub free_flow_elapsed: f64,
    /// Delay accumulated before each reroute, seconds
    pub reroute_delay: f64,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        kind: VehicleKind,
        origin: NodeId,
        destination: NodeId,
        base_speed_kph: f64,
        position: GeoPoint,
        now: f64,
    ) -> Self {
        Self {
            id,
            kind,
            origin,
            destination,
            current_node: origin,
            position,
            route_nodes: vec![origin],
            route: Vec::new(),
            route_progress: 0,
            edge_progress: 0.0,
            status: VehicleStatus::Waiting,
            base_speed_kph,
            speed_kph: 0.0,
            reroute_count: 0,
            eta: now,
            departed_at: now,
            free_flow_elapsed: 0.0,
            reroute_delay: 0.0,
        }
    }

    /// The edge being traversed, if the vehicle is on the move
    pub fn current_edge(&self) -> Option<EdgeId> {
        match self.status {
            VehicleStatus::Moving | VehicleStatus::Waiting => self.route.get(self.route_progress).copied(),
            VehicleStatus::Stuck | VehicleStatus::Arrived => None,
        }
    }

    /// Edges still ahead, starting with the current one
    pub fn remaining_route(&self) -> &[EdgeId] {
        self.route.get(self.route_progress..).unwrap_or(&[])
    }

    /// Current edge plus up to `lookahead` edges after it
    pub fn upcoming_edges(&self, lookahead: usize) -> &[EdgeId] {
        let remaining = self.remaining_route();
        &remaining[..remaining.len().min(lookahead + 1)]
    }

    /// Time spent on the trip beyond what free-flow driving would have taken
    pub fn delay(&self, now: f64) -> f64 {
        ((now - self.departed_at) - self.free_flow_elapsed).max(0.0)
    }

    /// Whether `route` (searched from `from`) is the road this vehicle is
    /// already on
    pub fn already_follows(&self, route: &Route, network: &RoadNetwork) -> bool {
        if self.status != VehicleStatus::Moving {
            return false;
        }
        let Some(current) = self.current_edge().and_then(|edge| network.edge(edge)) else {
            return false;
        };
        let from = route.nodes.first().copied();
        let remaining = self.remaining_route();
        if from == Some(current.source) {
            route.edges.as_slice() == remaining
        } else if from == Some(current.target) {
            route.edges.as_slice() == &remaining[1..]
        } else {
            false
        }
    }

    /// Start following a freshly computed route from its first node
    pub fn assign_route(&mut self, route: Route, network: &RoadNetwork, now: f64) {
        self.current_node = route.nodes.first().copied().unwrap_or(self.current_node);
        if let Some(position) = network.position(self.current_node) {
            self.position = position;
        }
        self.route_nodes = route.nodes;
        self.route = route.edges;
        self.route_progress = 0;
        self.edge_progress = 0.0;
        self.status = if self.route.is_empty() {
            VehicleStatus::Arrived
        } else {
            VehicleStatus::Moving
        };
        self.refresh_speed(network);
        self.refresh_eta(network, now);
    }

    /// Mark the vehicle as having no usable route from where it stands
    pub fn mark_stuck(&mut self) {
        self.route_nodes = vec![self.current_node];
        self.route.clear();
        self.route_progress = 0;
        self.edge_progress = 0.0;
        self.status = VehicleStatus::Stuck;
        self.speed_kph = 0.0;
    }

    /// Advance along the route by `delta_secs` of simulated time
    ///
    /// Time left over after finishing an edge carries onto the next one.
    pub fn update(&mut self, delta_secs: f64, network: &RoadNetwork, now: f64) -> SimResult<VehicleUpdate> {
        match self.status {
            VehicleStatus::Arrived => return Ok(VehicleUpdate::Arrived),
            VehicleStatus::Stuck => return Ok(VehicleUpdate::Idle),
            VehicleStatus::Waiting if self.route.is_empty() => return Ok(VehicleUpdate::Idle),
            VehicleStatus::Waiting | VehicleStatus::Moving => {}
        }
        self.status = VehicleStatus::Moving;

        let mut remaining = delta_secs.max(0.0);
        while let Some(edge_id) = self.route.get(self.route_progress).copied() {
            let edge = network.edge(edge_id).ok_or(SimError::EdgeNotFound(edge_id))?;
            let needed = (1.0 - self.edge_progress) * edge.travel_time;

            if remaining + CROSSING_EPSILON < needed {
                let fraction = remaining / edge.travel_time;
                self.edge_progress += fraction;
                self.free_flow_elapsed += fraction * edge.base_travel_time;
                break;
            }

            remaining = (remaining - needed).max(0.0);
            self.free_flow_elapsed += (1.0 - self.edge_progress) * edge.base_travel_time;
            self.edge_progress = 0.0;
            self.route_progress += 1;
            self.current_node = edge.target;

            if self.route_progress >= self.route.len() {
                self.status = VehicleStatus::Arrived;
                self.speed_kph = 0.0;
                self.eta = now;
                if let Some(position) = network.position(self.destination) {
                    self.position = position;
                }
                return Ok(VehicleUpdate::Arrived);
            }
        }

        self.refresh_position(network);
        self.refresh_speed(network);
        self.refresh_eta(network, now);
        Ok(VehicleUpdate::Moved)
    }

    fn refresh_position(&mut self, network: &RoadNetwork) {
        let endpoints = self.current_edge().and_then(|edge| network.endpoints(edge));
        if let Some((start, end)) = endpoints {
            self.position = start.lerp(&end, self.edge_progress.clamp(0.0, 1.0));
        }
    }

    /// Base speed attenuated by congestion on the current edge
    pub fn refresh_speed(&mut self, network: &RoadNetwork) {
        self.speed_kph = match self.current_edge().and_then(|edge| network.congestion(edge)) {
            Some(congestion) => {
                (self.base_speed_kph * (1.0 - CONGESTION_SPEED_PENALTY * congestion)).max(MIN_SPEED_KPH)
            }
            None => 0.0,
        };
    }

    /// Sum of remaining travel times, current edge weighted by what is left
    pub fn refresh_eta(&mut self, network: &RoadNetwork, now: f64) {
        let mut remaining_time = 0.0;
        for (offset, edge) in self.remaining_route().iter().enumerate() {
            let travel_time = network.travel_time(*edge).unwrap_or(0.0);
            remaining_time += if offset == 0 {
                travel_time * (1.0 - self.edge_progress)
            } else {
                travel_time
            };
        }
        self.eta = now + remaining_time;
    }
}
