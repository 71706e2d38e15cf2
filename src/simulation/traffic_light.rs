//! Traffic light state machine
//!
//! One light per intersection node. The phase always cycles
//! red -> green -> yellow -> red; timing policies only change how long each
//! phase lasts.

use serde::Serialize;

use super::types::{ControlMode, EdgeId, GeoPoint, LightId, LightState, NodeId};

/// Clearance phase length in seconds, independent of any policy
pub const YELLOW_DURATION: f64 = 5.0;

/// Guards against a huge tick skipping through many phases in one update
const MAX_TRANSITIONS_PER_UPDATE: usize = 3;

/// Phase durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalTimings {
    pub red: f64,
    pub green: f64,
    pub yellow: f64,
}

impl SignalTimings {
    pub fn new(red: f64, green: f64) -> Self {
        Self {
            red,
            green,
            yellow: YELLOW_DURATION,
        }
    }

    pub fn duration(&self, state: LightState) -> f64 {
        match state {
            LightState::Red => self.red,
            LightState::Green => self.green,
            LightState::Yellow => self.yellow,
        }
    }
}

/// Value estimate per phase, kept between optimizer passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StateValues {
    pub red: f64,
    pub green: f64,
    pub yellow: f64,
}

impl StateValues {
    pub fn get(&self, state: LightState) -> f64 {
        match state {
            LightState::Red => self.red,
            LightState::Green => self.green,
            LightState::Yellow => self.yellow,
        }
    }

    pub fn set(&mut self, state: LightState, value: f64) {
        match state {
            LightState::Red => self.red = value,
            LightState::Green => self.green = value,
            LightState::Yellow => self.yellow = value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrafficLight {
    pub id: LightId,
    pub node: NodeId,
    pub position: GeoPoint,
    pub state: LightState,
    pub timings: SignalTimings,
    pub last_change: f64,
    pub next_change: f64,
    /// Vehicles on incoming edges at the last update
    pub queue_length: u32,
    pub control_mode: ControlMode,
    /// End of a manual override; `None` while manual means frozen until released
    pub manual_until: Option<f64>,
    pub incoming_edges: Vec<EdgeId>,
    pub outgoing_edges: Vec<EdgeId>,
    pub values: StateValues,
    /// Phase changes since creation
    pub transitions: u64,
}

impl TrafficLight {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: LightId,
        node: NodeId,
        position: GeoPoint,
        incoming_edges: Vec<EdgeId>,
        outgoing_edges: Vec<EdgeId>,
        timings: SignalTimings,
        control_mode: ControlMode,
        now: f64,
    ) -> Self {
        let state = LightState::Red;
        Self {
            id,
            node,
            position,
            state,
            timings,
            last_change: now,
            next_change: now + timings.duration(state),
            queue_length: 0,
            control_mode,
            manual_until: None,
            incoming_edges,
            outgoing_edges,
            values: StateValues::default(),
            transitions: 0,
        }
    }

    /// Advance the phase if it is due
    ///
    /// A manual light only moves again once its override window has passed,
    /// after which it returns to `release_to`. Returns whether the phase
    /// changed.
    pub fn update(&mut self, now: f64, release_to: ControlMode) -> bool {
        if self.control_mode == ControlMode::Manual {
            match self.manual_until {
                Some(until) if now >= until => {
                    self.control_mode = release_to;
                    self.manual_until = None;
                }
                _ => return false,
            }
        }

        let mut changed = false;
        for _ in 0..MAX_TRANSITIONS_PER_UPDATE {
            if now < self.next_change {
                break;
            }
            self.state = self.state.next();
            self.last_change = self.next_change;
            self.next_change = self.last_change + self.timings.duration(self.state);
            self.transitions += 1;
            changed = true;
        }

        if now >= self.next_change {
            self.last_change = now;
            self.next_change = now + self.timings.duration(self.state);
        }

        changed
    }

    /// Force a phase immediately and hold it for `window` seconds
    pub fn set_state(&mut self, state: LightState, now: f64, window: f64) {
        if self.state != state {
            self.transitions += 1;
        }
        self.state = state;
        self.last_change = now;
        self.next_change = now + window;
        self.control_mode = ControlMode::Manual;
        self.manual_until = Some(now + window);
    }

    /// Hold the current phase until [`release`](Self::release) is called
    pub fn freeze(&mut self) {
        self.control_mode = ControlMode::Manual;
        self.manual_until = None;
    }

    pub fn release(&mut self, mode: ControlMode, now: f64) {
        self.control_mode = mode;
        self.manual_until = None;
        if self.next_change < now {
            self.last_change = now;
            self.next_change = now + self.timings.duration(self.state);
        }
    }

    /// Install new phase durations; the running phase keeps its deadline
    pub fn set_timings(&mut self, timings: SignalTimings) {
        self.timings = SignalTimings {
            yellow: YELLOW_DURATION,
            ..timings
        };
    }
}
