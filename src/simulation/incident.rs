//! Transient incidents that bias congestion on a single edge
//!
//! Injecting an incident raises the imposed congestion of the nearest edge
//! and reroutes vehicles heading over it. When the incident clears, the edge
//! is relieved in two steps: an immediate drop, then a gradual decay of
//! whatever remains.

use std::collections::BTreeSet;

use log::{debug, info};
use rand::Rng;
use serde::Serialize;
use slotmap::SlotMap;

use super::error::{SimError, SimResult};
use super::fleet::{FleetManager, RouteRequest};
use super::road_network::RoadNetwork;
use super::router::Router;
use super::types::{EdgeId, GeoPoint, IncidentId, IncidentKind, RoutingAlgorithm};

/// Imposed congestion of an edge blocked by an accident
pub const ACCIDENT_CONGESTION: f64 = 0.9;
/// Imposed congestion of an edge under construction
pub const CONSTRUCTION_CONGESTION: f64 = 0.6;
/// Added on top of current congestion by a congestion incident
pub const CONGESTION_BUMP: f64 = 0.5;
/// Immediate relief when an incident clears
pub const CLEARANCE_RELIEF: f64 = 0.5;
/// Residual imposed congestion shed per simulated second after clearance
pub const RESIDUAL_DECAY_PER_SEC: f64 = 0.02;

#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: IncidentId,
    pub location: GeoPoint,
    pub kind: IncidentKind,
    pub edge: EdgeId,
    pub created_at: f64,
    /// Seconds
    pub duration: f64,
    pub expected_clearance: f64,
    /// Congestion level the incident imposed on its edge
    pub severity: f64,
}

/// Result of a successful injection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Injection {
    pub id: IncidentId,
    pub edge: EdgeId,
    pub rerouted: usize,
}

#[derive(Debug, Default)]
pub struct IncidentManager {
    incidents: SlotMap<IncidentId, Incident>,
    /// Cleared edges still shedding imposed congestion
    recovering: BTreeSet<EdgeId>,
    injected: u64,
    cleared: u64,
}

impl IncidentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub fn get(&self, id: IncidentId) -> Option<&Incident> {
        self.incidents.get(id)
    }

    pub fn incidents(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.values()
    }

    pub fn injected(&self) -> u64 {
        self.injected
    }

    pub fn cleared(&self) -> u64 {
        self.cleared
    }

    pub fn is_recovering(&self, edge: EdgeId) -> bool {
        self.recovering.contains(&edge)
    }

    fn has_active_incident(&self, edge: EdgeId) -> bool {
        self.incidents.values().any(|incident| incident.edge == edge)
    }

    /// Place an incident on the edge whose midpoint is closest to `location`
    #[allow(clippy::too_many_arguments)]
    pub fn inject<R: Rng>(
        &mut self,
        location: GeoPoint,
        kind: IncidentKind,
        network: &mut RoadNetwork,
        fleet: &mut FleetManager,
        router: &Router,
        algorithm: RoutingAlgorithm,
        rng: &mut R,
        now: f64,
    ) -> SimResult<Injection> {
        if !location.is_finite() {
            return Err(SimError::InvalidArgument(
                "incident location must have finite coordinates".to_string(),
            ));
        }
        let edge = network
            .nearest_edge(&location)
            .ok_or(SimError::NoTarget("network has no edges"))?;
        let current = network.congestion(edge).ok_or(SimError::EdgeNotFound(edge))?;

        let level = match kind {
            IncidentKind::Accident => ACCIDENT_CONGESTION,
            IncidentKind::Congestion => (current + CONGESTION_BUMP).min(1.0),
            IncidentKind::Construction => CONSTRUCTION_CONGESTION,
        };
        network.update_congestion(edge, level)?;
        self.recovering.remove(&edge);

        let duration = rng.random_range(kind.duration_range_secs()) as f64;
        let id = self.incidents.insert_with_key(|id| Incident {
            id,
            location,
            kind,
            edge,
            created_at: now,
            duration,
            expected_clearance: now + duration,
            severity: level,
        });
        self.injected += 1;

        let request = RouteRequest {
            network,
            router,
            algorithm,
            now,
        };
        let rerouted = fleet.reroute_affected(&[edge], request);

        info!(
            "Incident {:?} ({:?}) on {} for {:.0}s, {} vehicles rerouted",
            id, kind, edge, duration, rerouted
        );
        Ok(Injection { id, edge, rerouted })
    }

    /// Clear every incident whose clearance time has come
    ///
    /// Also advances the decay of edges cleared on earlier ticks.
    pub fn expire(&mut self, network: &mut RoadNetwork, now: f64, delta_secs: f64) -> Vec<Incident> {
        self.decay_recovering(network, delta_secs);

        let due: Vec<IncidentId> = self
            .incidents
            .iter()
            .filter(|(_, incident)| now >= incident.expected_clearance)
            .map(|(id, _)| id)
            .collect();

        let mut expired = Vec::with_capacity(due.len());
        for id in due {
            let Some(incident) = self.incidents.remove(id) else {
                continue;
            };
            self.cleared += 1;

            if !self.has_active_incident(incident.edge) {
                let imposed = network
                    .edge(incident.edge)
                    .map_or(0.0, |edge| edge.imposed_congestion);
                let relieved = (imposed - CLEARANCE_RELIEF).max(0.0);
                if network.update_congestion(incident.edge, relieved).is_ok() && relieved > 0.0 {
                    self.recovering.insert(incident.edge);
                }
            }

            debug!("Incident {:?} on {} cleared", id, incident.edge);
            expired.push(incident);
        }
        expired
    }

    fn decay_recovering(&mut self, network: &mut RoadNetwork, delta_secs: f64) {
        if delta_secs <= 0.0 {
            return;
        }
        let edges: Vec<EdgeId> = self.recovering.iter().copied().collect();
        for edge in edges {
            let Some(imposed) = network.edge(edge).map(|e| e.imposed_congestion) else {
                self.recovering.remove(&edge);
                continue;
            };
            let decayed = (imposed - RESIDUAL_DECAY_PER_SEC * delta_secs).max(0.0);
            if network.update_congestion(edge, decayed).is_err() || decayed <= 0.0 {
                self.recovering.remove(&edge);
            }
        }
    }

    /// Remove an incident early, relieving its edge like a normal clearance
    pub fn clear(&mut self, id: IncidentId, network: &mut RoadNetwork, now: f64) -> SimResult<Incident> {
        let incident = self
            .incidents
            .get_mut(id)
            .ok_or(SimError::IncidentNotFound(id))?;
        incident.expected_clearance = now;
        let edge = incident.edge;
        let mut expired = self.expire(network, now, 0.0);
        expired
            .iter()
            .position(|incident| incident.id == id)
            .map(|index| expired.swap_remove(index))
            .ok_or(SimError::IncidentNotFound(id))
            .inspect(|_| debug!("Incident {:?} on {} cleared early", id, edge))
    }

    /// A random point on a random edge, with accidents and congestion equally likely
    pub fn sample_location<R: Rng>(network: &RoadNetwork, rng: &mut R) -> Option<(GeoPoint, IncidentKind)> {
        let edge_count = network.edge_count();
        if edge_count == 0 {
            return None;
        }
        let edge = EdgeId(rng.random_range(0..edge_count));
        let (start, end) = network.endpoints(edge)?;
        let location = start.lerp(&end, rng.random::<f64>());
        let kind = if rng.random_bool(0.5) {
            IncidentKind::Accident
        } else {
            IncidentKind::Congestion
        };
        Some((location, kind))
    }
}
