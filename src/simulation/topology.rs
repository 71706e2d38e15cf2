//! Road topology handed over by an external supplier
//!
//! The simulation never fetches map data itself. Something implementing
//! [`TopologySource`] produces a [`Topology`] once at startup.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use super::types::{GeoPoint, NodeId};

/// Speed assumed when a supplier gives no hint (km/h)
pub const DEFAULT_SPEED_KPH: f64 = 30.0;
/// Length assumed when a supplier gives no length (m)
pub const DEFAULT_LENGTH_M: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub position: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: NodeId,
    pub target: NodeId,
    pub length_m: f64,
    pub lanes: u32,
    pub speed_kph: f64,
    pub name: Option<String>,
}

impl EdgeSpec {
    pub fn new(source: NodeId, target: NodeId, length_m: f64) -> Self {
        Self {
            source,
            target,
            length_m,
            lanes: 1,
            speed_kph: DEFAULT_SPEED_KPH,
            name: None,
        }
    }

    pub fn with_speed(mut self, speed_kph: f64) -> Self {
        self.speed_kph = speed_kph;
        self
    }

    pub fn with_lanes(mut self, lanes: u32) -> Self {
        self.lanes = lanes;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Nodes and directed edges as produced by a supplier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl Topology {
    /// The degenerate topology used when a supplier fails
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, lat: f64, lon: f64) -> NodeId {
        self.nodes.push(NodeSpec {
            position: GeoPoint::new(lat, lon),
        });
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_edge(&mut self, edge: EdgeSpec) {
        self.edges.push(edge);
    }

    /// Add a road in both directions, with the length taken from the
    /// great-circle distance between the endpoints
    pub fn add_two_way(&mut self, a: NodeId, b: NodeId, speed_kph: f64) {
        let length = match (self.nodes.get(a.index()), self.nodes.get(b.index())) {
            (Some(na), Some(nb)) => na.position.haversine_m(&nb.position).max(1.0),
            _ => DEFAULT_LENGTH_M,
        };
        self.edges.push(EdgeSpec::new(a, b, length).with_speed(speed_kph));
        self.edges.push(EdgeSpec::new(b, a, length).with_speed(speed_kph));
    }
}

/// External collaborator supplying the initial road network
pub trait TopologySource {
    fn load(&self) -> Result<Topology>;
}

/// A topology that is already in memory
impl TopologySource for Topology {
    fn load(&self) -> Result<Topology> {
        Ok(self.clone())
    }
}

/// Rectangular grid of two-way streets around a center point
///
/// Used by the headless runner; cells are `spacing_deg` apart (0.01° is
/// roughly 1 km).
#[derive(Debug, Clone)]
pub struct GridTopology {
    pub rows: usize,
    pub cols: usize,
    pub center: GeoPoint,
    pub spacing_deg: f64,
    pub speed_kph: f64,
}

impl Default for GridTopology {
    fn default() -> Self {
        Self {
            rows: 10,
            cols: 10,
            center: GeoPoint::new(37.7749, -122.4194),
            spacing_deg: 0.01,
            speed_kph: DEFAULT_SPEED_KPH,
        }
    }
}

impl TopologySource for GridTopology {
    fn load(&self) -> Result<Topology> {
        ensure!(self.rows > 0 && self.cols > 0, "grid must have at least one row and column");
        ensure!(self.spacing_deg > 0.0, "grid spacing must be positive");

        let mut topology = Topology::empty();
        let half_rows = (self.rows as f64 - 1.0) / 2.0;
        let half_cols = (self.cols as f64 - 1.0) / 2.0;

        for row in 0..self.rows {
            for col in 0..self.cols {
                let lat = self.center.lat + (row as f64 - half_rows) * self.spacing_deg;
                let lon = self.center.lon + (col as f64 - half_cols) * self.spacing_deg;
                topology.add_node(lat, lon);
            }
        }

        let id = |row: usize, col: usize| NodeId(row * self.cols + col);
        for row in 0..self.rows {
            for col in 0..self.cols {
                if col + 1 < self.cols {
                    topology.add_two_way(id(row, col), id(row, col + 1), self.speed_kph);
                }
                if row + 1 < self.rows {
                    topology.add_two_way(id(row, col), id(row + 1, col), self.speed_kph);
                }
            }
        }

        Ok(topology)
    }
}
