//! Core types for the traffic simulation
//!
//! Identifiers, coordinates and the closed enums shared by every subsystem.

use std::fmt;
use std::str::FromStr;

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use super::error::SimError;

/// Mean earth radius in meters, used for great-circle distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A road network node identifier
///
/// Dense index into the graph arena, stable for the lifetime of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<NodeIndex> for NodeId {
    fn from(index: NodeIndex) -> Self {
        NodeId(index.index())
    }
}

impl From<NodeId> for NodeIndex {
    fn from(id: NodeId) -> Self {
        NodeIndex::new(id.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A directed road segment identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub usize);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<EdgeIndex> for EdgeId {
    fn from(index: EdgeIndex) -> Self {
        EdgeId(index.index())
    }
}

impl From<EdgeId> for EdgeIndex {
    fn from(id: EdgeId) -> Self {
        EdgeIndex::new(id.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A traffic light identifier (index into the signal subsystem)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LightId(pub usize);

new_key_type! {
    /// Generational handle for a vehicle; stale after the vehicle is removed
    pub struct VehicleId;
    /// Generational handle for an incident
    pub struct IncidentId;
}

/// A point in geographic coordinates (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Squared Euclidean distance in coordinate space (degrees²)
    pub fn squared_distance(&self, other: &GeoPoint) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        dlat * dlat + dlon * dlon
    }

    /// Great-circle distance in meters
    pub fn haversine_m(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let dphi = (other.lat - self.lat).to_radians();
        let dlambda = (other.lon - self.lon).to_radians();
        let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }

    pub fn lerp(&self, other: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    pub fn midpoint(&self, other: &GeoPoint) -> GeoPoint {
        self.lerp(other, 0.5)
    }
}

/// Type of vehicle in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    Car,
    Bus,
    Truck,
}

impl VehicleKind {
    pub const ALL: [VehicleKind; 3] = [VehicleKind::Car, VehicleKind::Bus, VehicleKind::Truck];

    /// Base cruising speed range in km/h
    pub fn speed_range_kph(self) -> std::ops::Range<f64> {
        match self {
            VehicleKind::Car => 40.0..60.0,
            VehicleKind::Bus => 25.0..40.0,
            VehicleKind::Truck => 28.0..42.0,
        }
    }
}

impl FromStr for VehicleKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" => Ok(VehicleKind::Car),
            "bus" => Ok(VehicleKind::Bus),
            "truck" => Ok(VehicleKind::Truck),
            other => Err(SimError::InvalidArgument(format!("unknown vehicle type '{other}'"))),
        }
    }
}

/// Lifecycle status of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    /// Created, route not yet resolved
    Waiting,
    Moving,
    /// No route to the destination from the current node
    Stuck,
    Arrived,
}

/// Traffic light phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightState {
    Red,
    Green,
    Yellow,
}

impl LightState {
    /// Fixed cycle order red -> green -> yellow -> red
    pub fn next(self) -> LightState {
        match self {
            LightState::Red => LightState::Green,
            LightState::Green => LightState::Yellow,
            LightState::Yellow => LightState::Red,
        }
    }
}

impl FromStr for LightState {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" => Ok(LightState::Red),
            "green" => Ok(LightState::Green),
            "yellow" => Ok(LightState::Yellow),
            other => Err(SimError::InvalidArgument(format!("unknown light state '{other}'"))),
        }
    }
}

/// How a traffic light (or the whole signal subsystem) is controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Fixed cycle with queue-heuristic durations
    Auto,
    /// Frozen until released
    Manual,
    /// Fixed cycle with value-iteration durations
    Optimized,
}

impl FromStr for ControlMode {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ControlMode::Auto),
            "manual" => Ok(ControlMode::Manual),
            "optimized" => Ok(ControlMode::Optimized),
            other => Err(SimError::InvalidArgument(format!("unknown control mode '{other}'"))),
        }
    }
}

/// Path search algorithm selectable per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAlgorithm {
    Dijkstra,
    AStar,
}

impl FromStr for RoutingAlgorithm {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dijkstra" => Ok(RoutingAlgorithm::Dijkstra),
            "a_star" | "astar" | "a*" => Ok(RoutingAlgorithm::AStar),
            other => Err(SimError::InvalidArgument(format!("unknown routing algorithm '{other}'"))),
        }
    }
}

/// Kind of transient incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentKind {
    Accident,
    Congestion,
    Construction,
}

impl IncidentKind {
    /// Clearance duration range in simulated seconds
    pub fn duration_range_secs(self) -> std::ops::RangeInclusive<u32> {
        match self {
            IncidentKind::Accident => 300..=900,
            IncidentKind::Congestion => 180..=600,
            IncidentKind::Construction => 600..=1800,
        }
    }
}

impl FromStr for IncidentKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accident" => Ok(IncidentKind::Accident),
            "congestion" => Ok(IncidentKind::Congestion),
            "construction" => Ok(IncidentKind::Construction),
            other => Err(SimError::InvalidArgument(format!("unknown incident type '{other}'"))),
        }
    }
}
