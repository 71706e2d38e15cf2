//! Main simulation world that ties everything together
//!
//! [`SimWorld`] owns every subsystem and advances them in a fixed order each
//! tick, so no subsystem ever reads costs another one has not finished
//! writing:
//!
//! 1. queued commands
//! 2. incident expiry
//! 3. background vehicle spawns
//! 4. random incidents
//! 5. fleet movement
//! 6. occupancy feedback into congestion
//! 7. traffic lights
//! 8. stuck-vehicle retries and analytics, on their own intervals
//! 9. snapshot publication

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use super::analytics::Analytics;
use super::config::SimConfig;
use super::error::{SimError, SimResult};
use super::fleet::{FleetManager, RouteRequest};
use super::incident::{Incident, IncidentManager, Injection};
use super::road_network::RoadNetwork;
use super::router::Router;
use super::signals::{SignalController, SignalUpdate};
use super::snapshot::SimSnapshot;
use super::topology::{Topology, TopologySource};
use super::types::{
    ControlMode, GeoPoint, IncidentId, IncidentKind, LightState, NodeId, RoutingAlgorithm, VehicleId,
    VehicleKind,
};
use super::vehicle::Vehicle;

/// Partial settings change; `None` fields are left alone
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SettingsUpdate {
    pub speed_multiplier: Option<f64>,
    pub routing_algorithm: Option<RoutingAlgorithm>,
    pub signal_mode: Option<ControlMode>,
}

/// Control commands accepted by the simulation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    UpdateSettings(SettingsUpdate),
    SetLightState {
        node: NodeId,
        state: LightState,
    },
    AddVehicle {
        origin: Option<NodeId>,
        destination: Option<NodeId>,
        kind: VehicleKind,
    },
    AddIncident {
        location: GeoPoint,
        kind: IncidentKind,
    },
}

/// Successful command result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    /// False when the command found the simulation already in the requested state
    pub changed: bool,
    pub message: String,
    pub vehicle: Option<VehicleId>,
    pub incident: Option<IncidentId>,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            changed: true,
            message: message.into(),
            vehicle: None,
            incident: None,
        }
    }

    pub fn noop(message: impl Into<String>) -> Self {
        Self {
            changed: false,
            ..Self::ok(message)
        }
    }
}

pub type CommandResult = Result<CommandOutcome, SimError>;

/// What happened during one tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    /// Simulated time at the end of the tick
    pub time: f64,
    /// Results of commands queued before the tick, in submission order
    pub commands: Vec<CommandResult>,
    pub cleared_incidents: Vec<Incident>,
    pub spawned: Vec<VehicleId>,
    pub random_incident: Option<IncidentId>,
    /// Vehicles that reached their destination and were removed
    pub arrived: Vec<Vehicle>,
    pub signals: SignalUpdate,
    pub unstuck: usize,
}

/// The main simulation world
pub struct SimWorld {
    config: SimConfig,
    network: RoadNetwork,
    router: Router,
    fleet: FleetManager,
    signals: SignalController,
    incidents: IncidentManager,
    analytics: Analytics,
    rng: StdRng,

    pending: VecDeque<Command>,
    running: bool,

    /// Simulated seconds since construction
    time: f64,
    tick: u64,
    last_stuck_retry: f64,
    last_analytics: f64,

    snapshot: Arc<SimSnapshot>,
}

impl SimWorld {
    /// Build a world around an already loaded topology
    pub fn new(topology: &Topology, config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let network = RoadNetwork::from_topology(topology)?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let signals = SignalController::new(
            &network,
            &mut rng,
            config.signal_mode,
            config.manual_window,
            config.optimization_interval,
            0.0,
        );

        info!(
            "Road network ready: {} nodes, {} edges, {} traffic lights",
            network.node_count(),
            network.edge_count(),
            signals.len()
        );

        let mut world = Self {
            router: Router::new(config.max_search_expansions),
            fleet: FleetManager::new(config.reroute_lookahead),
            incidents: IncidentManager::new(),
            analytics: Analytics::new(),
            signals,
            network,
            rng,
            config,
            pending: VecDeque::new(),
            running: false,
            time: 0.0,
            tick: 0,
            last_stuck_retry: 0.0,
            last_analytics: 0.0,
            snapshot: Arc::default(),
        };
        world.record_analytics();
        world.publish();
        Ok(world)
    }

    /// Load the topology from a supplier, degrading to an empty network
    /// when the supplier fails
    pub fn from_source(source: &dyn TopologySource, config: SimConfig) -> SimResult<Self> {
        let topology = source.load().unwrap_or_else(|err| {
            warn!("Topology supplier failed, starting with an empty network: {err:#}");
            Topology::empty()
        });
        Self::new(&topology, config)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }

    /// Direct access for scripted scenarios; changes are picked up next tick
    pub fn network_mut(&mut self) -> &mut RoadNetwork {
        &mut self.network
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn fleet(&self) -> &FleetManager {
        &self.fleet
    }

    pub fn signals(&self) -> &SignalController {
        &self.signals
    }

    pub fn incidents(&self) -> &IncidentManager {
        &self.incidents
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<SimSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Queue a command for the start of the next tick
    pub fn submit(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    /// Apply a command immediately
    pub fn execute(&mut self, command: Command) -> CommandResult {
        match command {
            Command::Start => Ok(self.start()),
            Command::Stop => Ok(self.stop()),
            Command::UpdateSettings(update) => self.update_settings(update),
            Command::SetLightState { node, state } => {
                self.signals.set_state(node, state, self.time)?;
                Ok(CommandOutcome::ok(format!(
                    "traffic light at {node} set to {state:?}"
                )))
            }
            Command::AddVehicle {
                origin,
                destination,
                kind,
            } => {
                let id = self.spawn_vehicle(origin, destination, kind)?;
                Ok(CommandOutcome {
                    vehicle: Some(id),
                    ..CommandOutcome::ok(format!("{kind:?} added"))
                })
            }
            Command::AddIncident { location, kind } => {
                let injection = self.add_incident(location, kind)?;
                Ok(CommandOutcome {
                    incident: Some(injection.id),
                    ..CommandOutcome::ok(format!(
                        "{kind:?} incident added on {}, {} vehicles rerouted",
                        injection.edge, injection.rerouted
                    ))
                })
            }
        }
    }

    pub fn start(&mut self) -> CommandOutcome {
        if self.running {
            return CommandOutcome::noop("simulation already running");
        }
        self.running = true;
        info!("Simulation started at {:.1}s", self.time);
        CommandOutcome::ok("simulation started")
    }

    pub fn stop(&mut self) -> CommandOutcome {
        if !self.running {
            return CommandOutcome::noop("simulation already stopped");
        }
        self.running = false;
        info!("Simulation stopped at {:.1}s", self.time);
        CommandOutcome::ok("simulation stopped")
    }

    /// Apply a settings change; nothing is applied if any field is invalid
    pub fn update_settings(&mut self, update: SettingsUpdate) -> CommandResult {
        if let Some(multiplier) = update.speed_multiplier {
            if !multiplier.is_finite() || multiplier <= 0.0 {
                return Err(SimError::InvalidArgument(format!(
                    "speed multiplier must be positive, got {multiplier}"
                )));
            }
        }

        if let Some(multiplier) = update.speed_multiplier {
            self.config.speed_multiplier = multiplier;
        }
        if let Some(algorithm) = update.routing_algorithm {
            self.config.routing_algorithm = algorithm;
        }
        if let Some(mode) = update.signal_mode {
            self.config.signal_mode = mode;
            if mode != self.signals.mode() {
                self.signals.set_mode(mode, self.time);
            }
        }

        debug!("Settings updated: {:?}", update);
        Ok(CommandOutcome::ok("simulation settings updated"))
    }

    /// Add a vehicle; missing endpoints are picked at random
    pub fn spawn_vehicle(
        &mut self,
        origin: Option<NodeId>,
        destination: Option<NodeId>,
        kind: VehicleKind,
    ) -> SimResult<VehicleId> {
        let request = RouteRequest {
            network: &self.network,
            router: &self.router,
            algorithm: self.config.routing_algorithm,
            now: self.time,
        };
        self.fleet.spawn(request, &mut self.rng, origin, destination, kind)
    }

    pub fn add_incident(&mut self, location: GeoPoint, kind: IncidentKind) -> SimResult<Injection> {
        self.incidents.inject(
            location,
            kind,
            &mut self.network,
            &mut self.fleet,
            &self.router,
            self.config.routing_algorithm,
            &mut self.rng,
            self.time,
        )
    }

    /// Advance the whole simulation by exactly one tick of `delta_secs`
    /// simulated seconds
    ///
    /// Runs whether or not the simulation is started; the runner decides
    /// when to call it.
    pub fn step(&mut self, delta_secs: f64) -> TickReport {
        let delta = if delta_secs.is_finite() {
            delta_secs.max(0.0)
        } else {
            0.0
        };

        let commands = self.apply_pending();

        self.time += delta;
        self.tick += 1;
        let now = self.time;

        let cleared_incidents = self.incidents.expire(&mut self.network, now, delta);
        let spawned = self.spawn_background(delta);
        let random_incident = self.maybe_random_incident(delta);

        let arrived = self.fleet.advance(&self.network, delta, now);
        self.fleet.recompute_occupancy(&mut self.network);

        let signals = self.signals.update(&self.network, now);

        let mut unstuck = 0;
        if now - self.last_stuck_retry >= self.config.stuck_retry_interval {
            self.last_stuck_retry = now;
            let request = RouteRequest {
                network: &self.network,
                router: &self.router,
                algorithm: self.config.routing_algorithm,
                now,
            };
            unstuck = self.fleet.retry_stuck(request);
            if unstuck > 0 {
                debug!("{} stuck vehicles found a route", unstuck);
            }
        }

        if now - self.last_analytics >= self.config.analytics_interval {
            self.last_analytics = now;
            self.record_analytics();
            self.log_summary();
        }

        self.publish();

        TickReport {
            tick: self.tick,
            time: now,
            commands,
            cleared_incidents,
            spawned,
            random_incident,
            arrived,
            signals,
            unstuck,
        }
    }

    fn apply_pending(&mut self) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(self.pending.len());
        while let Some(command) = self.pending.pop_front() {
            let result = self.execute(command);
            if let Err(err) = &result {
                debug!("Command rejected: {}", err);
            }
            results.push(result);
        }
        results
    }

    /// `floor(rate * dt)` vehicles plus one more with the leftover
    /// probability, without exceeding the vehicle ceiling
    fn spawn_background(&mut self, delta: f64) -> Vec<VehicleId> {
        let expected = self.config.spawn_rate * delta;
        if expected <= 0.0 {
            return Vec::new();
        }
        let mut count = expected.floor() as usize;
        if self.rng.random::<f64>() < expected.fract() {
            count += 1;
        }
        count = count.min(self.config.max_vehicles.saturating_sub(self.fleet.len()));

        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let kind = *VehicleKind::ALL.choose(&mut self.rng).unwrap_or(&VehicleKind::Car);
            match self.spawn_vehicle(None, None, kind) {
                Ok(id) => spawned.push(id),
                Err(err) => {
                    debug!("Background spawn skipped: {}", err);
                    break;
                }
            }
        }
        spawned
    }

    fn maybe_random_incident(&mut self, delta: f64) -> Option<IncidentId> {
        let chance = self.config.incident_probability * delta;
        if chance <= 0.0 || self.rng.random::<f64>() >= chance {
            return None;
        }
        let (location, kind) = IncidentManager::sample_location(&self.network, &mut self.rng)?;
        match self.add_incident(location, kind) {
            Ok(injection) => Some(injection.id),
            Err(err) => {
                warn!("Random incident failed: {}", err);
                None
            }
        }
    }

    fn record_analytics(&mut self) {
        self.analytics.record(
            self.time,
            &self.network,
            &self.fleet,
            &self.signals,
            &self.incidents,
        );
    }

    /// Capture and store a fresh snapshot
    pub fn publish(&mut self) -> Arc<SimSnapshot> {
        self.snapshot = Arc::new(SimSnapshot::capture(self));
        self.snapshot()
    }

    /// Log the latest analytics at info level
    pub fn log_summary(&self) {
        let summary = self.analytics.latest();
        info!(
            "t={:.1}s vehicles={} (moving {}, stuck {}) avg_speed={:.1}km/h congestion={:.3} ({:+.3}) incidents={} reroutes={} completed={}/{} signal_eff={:.2}",
            summary.time,
            summary.active_vehicles,
            summary.moving_vehicles,
            summary.stuck_vehicles,
            summary.average_speed_kph,
            summary.average_congestion,
            summary.congestion_trend,
            summary.active_incidents,
            summary.total_reroutes,
            summary.vehicles_completed,
            summary.vehicles_spawned,
            summary.signal_efficiency,
        );
    }
}
