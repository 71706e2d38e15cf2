//! Standalone city traffic simulation
//!
//! The road network, router, fleet, traffic signals and incidents all live
//! here, tied together by [`SimWorld`]. Nothing in this module does I/O; the
//! road topology comes in through [`TopologySource`] and state goes out as
//! [`SimSnapshot`]s.

mod analytics;
mod config;
mod error;
mod fleet;
mod incident;
mod road_network;
mod router;
mod runner;
mod signals;
mod snapshot;
mod topology;
mod traffic_light;
mod types;
mod vehicle;
mod world;

pub use analytics::{Analytics, AnalyticsSummary, TREND_WINDOW};
pub use config::{SimConfig, DEFAULT_INCIDENT_PROBABILITY, DEFAULT_MAX_VEHICLES, DEFAULT_SPAWN_RATE};
pub use error::{ReasonCode, SimError, SimResult};
pub use fleet::{FleetManager, FleetStats, RouteRequest, DEFAULT_REROUTE_LOOKAHEAD};
pub use incident::{
    Incident, IncidentManager, Injection, ACCIDENT_CONGESTION, CLEARANCE_RELIEF, CONGESTION_BUMP,
    CONSTRUCTION_CONGESTION, RESIDUAL_DECAY_PER_SEC,
};
pub use road_network::{RoadEdge, RoadNetwork, RoadNode, CONGESTION_TIME_FACTOR, VEHICLES_PER_LANE};
pub use router::{Route, Router, DEFAULT_MAX_EXPANSIONS};
pub use runner::{RunnerClosed, SimulationRunner};
pub use signals::{
    queue_heuristic_timings, SignalController, SignalUpdate, ValueIteration, GREEN_MAX, GREEN_MIN,
    RED_BASE, RED_MAX, RED_MIN,
};
pub use snapshot::{GraphView, SettingsView, SimSnapshot, VehicleView};
pub use topology::{
    EdgeSpec, GridTopology, NodeSpec, Topology, TopologySource, DEFAULT_LENGTH_M, DEFAULT_SPEED_KPH,
};
pub use traffic_light::{SignalTimings, StateValues, TrafficLight, YELLOW_DURATION};
pub use types::{
    ControlMode, EdgeId, GeoPoint, IncidentId, IncidentKind, LightId, LightState, NodeId,
    RoutingAlgorithm, VehicleId, VehicleKind, VehicleStatus, EARTH_RADIUS_M,
};
pub use vehicle::{Vehicle, VehicleUpdate, CONGESTION_SPEED_PENALTY, MIN_SPEED_KPH};
pub use world::{Command, CommandOutcome, CommandResult, SettingsUpdate, SimWorld, TickReport};
