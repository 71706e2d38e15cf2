//! Shared topologies for the integration tests
//!
//! Edges built here are 1 km long at 36 km/h, so every free-flow edge takes
//! exactly 100 simulated seconds.

#![allow(dead_code)]

use city_traffic::simulation::{EdgeSpec, GridTopology, NodeId, RoadNetwork, SimConfig, SimWorld, Topology};

pub const EDGE_LENGTH_M: f64 = 1000.0;
pub const EDGE_SPEED_KPH: f64 = 36.0;
pub const EDGE_TIME_SECS: f64 = 100.0;

const CENTER_LAT: f64 = 37.7749;
const CENTER_LON: f64 = -122.4194;

pub fn edge(source: usize, target: usize) -> EdgeSpec {
    EdgeSpec::new(NodeId(source), NodeId(target), EDGE_LENGTH_M).with_speed(EDGE_SPEED_KPH)
}

/// One-way ring 0 -> 1 -> ... -> n-1 -> 0; edge `i` leaves node `i`
pub fn ring(n: usize) -> Topology {
    let mut topology = Topology::empty();
    for i in 0..n {
        let angle = i as f64 / n as f64 * std::f64::consts::TAU;
        topology.add_node(CENTER_LAT + 0.005 * angle.sin(), CENTER_LON + 0.005 * angle.cos());
    }
    for i in 0..n {
        topology.add_edge(edge(i, (i + 1) % n));
    }
    topology
}

/// One-way chain 0 -> 1 -> ... -> n-1
pub fn line(n: usize) -> Topology {
    let mut topology = Topology::empty();
    for i in 0..n {
        topology.add_node(CENTER_LAT, CENTER_LON + 0.01 * i as f64);
    }
    for i in 0..n.saturating_sub(1) {
        topology.add_edge(edge(i, i + 1));
    }
    topology
}

/// Two separate two-way pairs: 0 <-> 1 and 2 <-> 3
pub fn disconnected() -> Topology {
    let mut topology = Topology::empty();
    topology.add_node(CENTER_LAT, CENTER_LON);
    topology.add_node(CENTER_LAT, CENTER_LON + 0.01);
    topology.add_node(CENTER_LAT + 0.05, CENTER_LON);
    topology.add_node(CENTER_LAT + 0.05, CENTER_LON + 0.01);
    for (a, b) in [(0, 1), (2, 3)] {
        topology.add_edge(edge(a, b));
        topology.add_edge(edge(b, a));
    }
    topology
}

/// One-way diamond from 0 to 3
///
/// The north branch 0 -> 1 -> 3 costs 200 s; the south branch 0 -> 2 -> 3 is
/// longer at 240 s. Edges: e0 = 0->1, e1 = 1->3, e2 = 0->2, e3 = 2->3.
pub fn diamond() -> Topology {
    let mut topology = Topology::empty();
    topology.add_node(CENTER_LAT, CENTER_LON);
    topology.add_node(CENTER_LAT + 0.01, CENTER_LON + 0.01);
    topology.add_node(CENTER_LAT - 0.01, CENTER_LON + 0.01);
    topology.add_node(CENTER_LAT, CENTER_LON + 0.02);
    topology.add_edge(edge(0, 1));
    topology.add_edge(edge(1, 3));
    topology.add_edge(EdgeSpec::new(NodeId(0), NodeId(2), 1200.0).with_speed(EDGE_SPEED_KPH));
    topology.add_edge(EdgeSpec::new(NodeId(2), NodeId(3), 1200.0).with_speed(EDGE_SPEED_KPH));
    topology
}

pub fn grid(rows: usize, cols: usize) -> Topology {
    use city_traffic::simulation::TopologySource;

    GridTopology {
        rows,
        cols,
        ..GridTopology::default()
    }
    .load()
    .expect("grid topology")
}

pub fn network(topology: &Topology) -> RoadNetwork {
    RoadNetwork::from_topology(topology).expect("valid topology")
}

/// World with no background spawns or random incidents
pub fn quiet_world(topology: &Topology) -> SimWorld {
    SimWorld::new(topology, SimConfig::quiet(42)).expect("valid world")
}
