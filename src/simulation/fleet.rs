//! Vehicle spawning and management for the traffic simulation
//!
//! The fleet owns every active vehicle, moves them each tick, and turns their
//! positions into per-edge occupancy for the road network.

use log::{debug, warn};
use rand::Rng;
use serde::Serialize;
use slotmap::SlotMap;

use super::error::{SimError, SimResult};
use super::road_network::RoadNetwork;
use super::router::Router;
use super::types::{EdgeId, NodeId, RoutingAlgorithm, VehicleId, VehicleKind, VehicleStatus};
use super::vehicle::{Vehicle, VehicleUpdate};

/// Default number of route edges past the current one checked for incidents
pub const DEFAULT_REROUTE_LOOKAHEAD: usize = 3;

/// Running totals kept across the fleet's lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetStats {
    pub spawned: u64,
    pub completed: u64,
    pub reroutes: u64,
    /// Seconds of delay vehicles had accumulated when they were rerouted
    pub reroute_delay: f64,
    /// Seconds spent by completed trips, for average trip time
    pub completed_trip_time: f64,
}

/// Routing inputs shared by every fleet call that needs a path
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub network: &'a RoadNetwork,
    pub router: &'a Router,
    pub algorithm: RoutingAlgorithm,
    pub now: f64,
}

#[derive(Debug)]
pub struct FleetManager {
    vehicles: SlotMap<VehicleId, Vehicle>,
    stats: FleetStats,
    lookahead: usize,
}

impl Default for FleetManager {
    fn default() -> Self {
        Self::new(DEFAULT_REROUTE_LOOKAHEAD)
    }
}

impl FleetManager {
    pub fn new(lookahead: usize) -> Self {
        Self {
            vehicles: SlotMap::with_key(),
            stats: FleetStats::default(),
            lookahead,
        }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn get(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn stats(&self) -> &FleetStats {
        &self.stats
    }

    pub fn count_with_status(&self, status: VehicleStatus) -> usize {
        self.vehicles.values().filter(|v| v.status == status).count()
    }

    /// Spawn a vehicle; missing endpoints are sampled as distinct random nodes
    ///
    /// A vehicle without a route is still created, in `Stuck` status.
    pub fn spawn<R: Rng>(
        &mut self,
        request: RouteRequest<'_>,
        rng: &mut R,
        origin: Option<NodeId>,
        destination: Option<NodeId>,
        kind: VehicleKind,
    ) -> SimResult<VehicleId> {
        let network = request.network;
        for node in [origin, destination].into_iter().flatten() {
            if !network.contains_node(node) {
                return Err(SimError::NodeNotFound(node));
            }
        }

        let node_count = network.node_count();
        let origin = match origin {
            Some(node) => node,
            None if node_count >= 2 => match destination {
                Some(destination) => sample_other(rng, node_count, destination),
                None => NodeId(rng.random_range(0..node_count)),
            },
            None => return Err(SimError::NoTarget("network has fewer than two nodes")),
        };
        let destination = match destination {
            Some(node) => node,
            None if node_count >= 2 => sample_other(rng, node_count, origin),
            None => return Err(SimError::NoTarget("network has fewer than two nodes")),
        };
        if origin == destination {
            return Err(SimError::InvalidArgument(format!(
                "origin and destination are both {origin}"
            )));
        }

        let base_speed = rng.random_range(kind.speed_range_kph());
        let position = network.position(origin).unwrap_or_default();
        let id = self.vehicles.insert_with_key(|id| {
            Vehicle::new(id, kind, origin, destination, base_speed, position, request.now)
        });
        self.stats.spawned += 1;

        let route = request
            .router
            .find_path(network, origin, destination, request.algorithm);
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            match route {
                Ok(route) => vehicle.assign_route(route, network, request.now),
                Err(err) => {
                    debug!("Vehicle {:?} spawned without a route: {}", id, err);
                    vehicle.mark_stuck();
                }
            }
        }

        Ok(id)
    }

    /// Move every vehicle by `delta_secs`; vehicles that reach their
    /// destination are removed and handed back
    pub fn advance(&mut self, network: &RoadNetwork, delta_secs: f64, now: f64) -> Vec<Vehicle> {
        let mut arrived_ids = Vec::new();

        for (id, vehicle) in self.vehicles.iter_mut() {
            match vehicle.update(delta_secs, network, now) {
                Ok(VehicleUpdate::Arrived) => arrived_ids.push(id),
                Ok(VehicleUpdate::Moved | VehicleUpdate::Idle) => {}
                Err(err) => {
                    warn!("Vehicle {:?} lost its route: {}", id, err);
                    vehicle.mark_stuck();
                }
            }
        }

        let mut arrived = Vec::with_capacity(arrived_ids.len());
        for id in arrived_ids {
            if let Some(vehicle) = self.vehicles.remove(id) {
                self.stats.completed += 1;
                self.stats.completed_trip_time += now - vehicle.departed_at;
                arrived.push(vehicle);
            }
        }
        arrived
    }

    /// Count vehicles per edge and push the counts into the network
    pub fn recompute_occupancy(&self, network: &mut RoadNetwork) -> Vec<u32> {
        let mut counts = vec![0u32; network.edge_count()];
        for vehicle in self.vehicles.values() {
            if let Some(slot) = vehicle.current_edge().and_then(|edge| counts.get_mut(edge.index())) {
                *slot += 1;
            }
        }

        for (index, count) in counts.iter().enumerate() {
            if let Err(err) = network.update_vehicle_count(EdgeId(index), *count) {
                warn!("Failed to record occupancy: {}", err);
            }
        }
        counts
    }

    /// Recompute a vehicle's route from the node nearest to where it is
    ///
    /// Returns `Ok(true)` when the vehicle switched to a different route and
    /// `Ok(false)` when the best route is the one it already follows.
    pub fn reroute(&mut self, id: VehicleId, request: RouteRequest<'_>) -> SimResult<bool> {
        let network = request.network;
        let vehicle = self.vehicles.get_mut(id).ok_or(SimError::VehicleNotFound(id))?;
        if vehicle.status == VehicleStatus::Arrived {
            return Ok(false);
        }

        let snapped = network
            .nearest_node(&vehicle.position)
            .unwrap_or(vehicle.current_node);
        let route = request
            .router
            .find_path(network, snapped, vehicle.destination, request.algorithm)?;

        if vehicle.already_follows(&route, network) {
            return Ok(false);
        }

        let delay = vehicle.delay(request.now);
        vehicle.reroute_delay += delay;
        vehicle.reroute_count += 1;
        vehicle.assign_route(route, network, request.now);

        self.stats.reroutes += 1;
        self.stats.reroute_delay += delay;
        debug!(
            "Rerouted vehicle {:?} from {} ({:.1}s delay so far)",
            id, snapped, delay
        );
        Ok(true)
    }

    /// Reroute vehicles whose current or next few edges touch `edges`
    ///
    /// Stuck vehicles are retried as well. Returns how many vehicles ended up
    /// on a new route.
    pub fn reroute_affected(&mut self, edges: &[EdgeId], request: RouteRequest<'_>) -> usize {
        let affected: Vec<VehicleId> = self
            .vehicles
            .iter()
            .filter(|(_, vehicle)| match vehicle.status {
                VehicleStatus::Moving => vehicle
                    .upcoming_edges(self.lookahead)
                    .iter()
                    .any(|edge| edges.contains(edge)),
                VehicleStatus::Stuck => true,
                VehicleStatus::Waiting | VehicleStatus::Arrived => false,
            })
            .map(|(id, _)| id)
            .collect();

        self.reroute_all(affected, request)
    }

    /// Give every stuck vehicle another chance to find a route
    pub fn retry_stuck(&mut self, request: RouteRequest<'_>) -> usize {
        let stuck: Vec<VehicleId> = self
            .vehicles
            .iter()
            .filter(|(_, vehicle)| vehicle.status == VehicleStatus::Stuck)
            .map(|(id, _)| id)
            .collect();

        self.reroute_all(stuck, request)
    }

    fn reroute_all(&mut self, ids: Vec<VehicleId>, request: RouteRequest<'_>) -> usize {
        let mut rerouted = 0;
        for id in ids {
            match self.reroute(id, request) {
                Ok(true) => rerouted += 1,
                Ok(false) => {}
                Err(err) => debug!("Vehicle {:?} kept its route: {}", id, err),
            }
        }
        rerouted
    }

    /// Take a vehicle out of the simulation without counting a completion
    pub fn remove(&mut self, id: VehicleId) -> SimResult<Vehicle> {
        self.vehicles.remove(id).ok_or(SimError::VehicleNotFound(id))
    }
}

/// A random node other than `exclude`, drawn from the remaining n-1
fn sample_other<R: Rng>(rng: &mut R, node_count: usize, exclude: NodeId) -> NodeId {
    let pick = rng.random_range(0..node_count - 1);
    NodeId(if pick >= exclude.index() { pick + 1 } else { pick })
}
