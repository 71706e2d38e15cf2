//! Congestion-aware road network graph
//!
//! Owns every node and edge. Other subsystems refer to roads by
//! [`NodeId`]/[`EdgeId`] and go through this type to read or change
//! congestion, so `travel_time` has exactly one source of truth.

use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;

use super::error::{SimError, SimResult};
use super::topology::{EdgeSpec, NodeSpec, Topology};
use super::types::{EdgeId, GeoPoint, NodeId};

/// Travel time grows to 5x free-flow at full congestion
pub const CONGESTION_TIME_FACTOR: f64 = 4.0;

/// Vehicles a single lane holds before it counts as fully congested
pub const VEHICLES_PER_LANE: u32 = 10;

/// A node in the road network
#[derive(Debug, Clone, Serialize)]
pub struct RoadNode {
    pub id: NodeId,
    pub position: GeoPoint,
    /// More than one outgoing road
    pub is_intersection: bool,
}

/// Directed road segment with its live congestion state
#[derive(Debug, Clone, Serialize)]
pub struct RoadEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub length_m: f64,
    pub lanes: u32,
    pub capacity: u32,
    pub speed_kph: f64,
    /// Free-flow traversal time in seconds, fixed at construction
    pub base_travel_time: f64,
    pub travel_time: f64,
    /// Effective congestion, max of occupancy and imposed congestion
    pub congestion: f64,
    /// Congestion forced from outside (incidents)
    pub imposed_congestion: f64,
    pub vehicle_count: u32,
    pub name: Option<String>,
}

impl RoadEdge {
    fn from_spec(id: EdgeId, spec: &EdgeSpec) -> Self {
        let lanes = spec.lanes.max(1);
        let base_travel_time = (spec.length_m / 1000.0) / (spec.speed_kph / 3600.0);
        Self {
            id,
            source: spec.source,
            target: spec.target,
            length_m: spec.length_m,
            lanes,
            capacity: lanes * VEHICLES_PER_LANE,
            speed_kph: spec.speed_kph,
            base_travel_time,
            travel_time: base_travel_time,
            congestion: 0.0,
            imposed_congestion: 0.0,
            vehicle_count: 0,
            name: spec.name.clone(),
        }
    }

    /// Occupancy as a fraction of capacity, saturating at 1
    pub fn occupancy_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        (self.vehicle_count as f64 / self.capacity as f64).min(1.0)
    }

    fn refresh(&mut self) {
        self.congestion = self.occupancy_ratio().max(self.imposed_congestion);
        self.travel_time = self.base_travel_time * (1.0 + CONGESTION_TIME_FACTOR * self.congestion);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    /// Node and edge indices double as `NodeId`/`EdgeId`; nothing is ever removed
    graph: DiGraph<RoadNode, RoadEdge>,

    /// Fastest free-flow speed anywhere in the network (m/s)
    max_free_flow_speed: f64,
}

impl RoadNetwork {
    /// Build the graph from supplier data
    pub fn build(nodes: &[NodeSpec], edges: &[EdgeSpec]) -> SimResult<Self> {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());

        for (index, spec) in nodes.iter().enumerate() {
            if !spec.position.is_finite() {
                return Err(SimError::InvalidArgument(format!(
                    "node {index} has non-finite coordinates"
                )));
            }
            graph.add_node(RoadNode {
                id: NodeId(index),
                position: spec.position,
                is_intersection: false,
            });
        }

        let mut max_free_flow_speed: f64 = 0.0;
        for (index, spec) in edges.iter().enumerate() {
            for endpoint in [spec.source, spec.target] {
                if endpoint.index() >= nodes.len() {
                    return Err(SimError::NodeNotFound(endpoint));
                }
            }
            if !(spec.length_m.is_finite() && spec.length_m > 0.0) {
                return Err(SimError::InvalidArgument(format!(
                    "edge {index} has invalid length {}",
                    spec.length_m
                )));
            }
            if !(spec.speed_kph.is_finite() && spec.speed_kph > 0.0) {
                return Err(SimError::InvalidArgument(format!(
                    "edge {index} has invalid speed {}",
                    spec.speed_kph
                )));
            }

            let edge = RoadEdge::from_spec(EdgeId(index), spec);

            // The geometric speed bound keeps the A* heuristic admissible even
            // when a supplier reports a length shorter than the straight line.
            let straight_line =
                nodes[spec.source.index()].position.haversine_m(&nodes[spec.target.index()].position);
            max_free_flow_speed = max_free_flow_speed
                .max(spec.speed_kph / 3.6)
                .max(straight_line / edge.base_travel_time);

            graph.add_edge(spec.source.into(), spec.target.into(), edge);
        }

        for index in graph.node_indices().collect::<Vec<_>>() {
            let out_degree = graph.edges_directed(index, Direction::Outgoing).count();
            graph[index].is_intersection = out_degree > 1;
        }

        Ok(Self {
            graph,
            max_free_flow_speed,
        })
    }

    pub fn from_topology(topology: &Topology) -> SimResult<Self> {
        Self::build(&topology.nodes, &topology.edges)
    }

    pub fn graph(&self) -> &DiGraph<RoadNode, RoadEdge> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        node.index() < self.graph.node_count()
    }

    pub fn node(&self, node: NodeId) -> Option<&RoadNode> {
        self.graph.node_weight(node.into())
    }

    pub fn edge(&self, edge: EdgeId) -> Option<&RoadEdge> {
        self.graph.edge_weight(edge.into())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RoadNode> {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> impl Iterator<Item = &RoadEdge> {
        self.graph.edge_weights()
    }

    pub fn position(&self, node: NodeId) -> Option<GeoPoint> {
        self.node(node).map(|n| n.position)
    }

    /// Current traversal cost of an edge in seconds
    pub fn travel_time(&self, edge: EdgeId) -> Option<f64> {
        self.edge(edge).map(|e| e.travel_time)
    }

    pub fn congestion(&self, edge: EdgeId) -> Option<f64> {
        self.edge(edge).map(|e| e.congestion)
    }

    /// Fastest possible free-flow speed in m/s; lower bound for time estimates
    pub fn max_free_flow_speed(&self) -> f64 {
        self.max_free_flow_speed
    }

    fn edge_mut(&mut self, edge: EdgeId) -> SimResult<&mut RoadEdge> {
        self.graph
            .edge_weight_mut(edge.into())
            .ok_or(SimError::EdgeNotFound(edge))
    }

    /// Impose a congestion level on an edge, clamped to [0, 1]
    ///
    /// Returns the resulting effective congestion, which may be higher when
    /// the edge is crowded.
    pub fn update_congestion(&mut self, edge: EdgeId, level: f64) -> SimResult<f64> {
        if level.is_nan() {
            return Err(SimError::InvalidArgument(format!(
                "congestion for {edge} must be a number"
            )));
        }
        let road = self.edge_mut(edge)?;
        road.imposed_congestion = level.clamp(0.0, 1.0);
        road.refresh();
        Ok(road.congestion)
    }

    /// Record how many vehicles currently occupy an edge
    pub fn update_vehicle_count(&mut self, edge: EdgeId, count: u32) -> SimResult<()> {
        let road = self.edge_mut(edge)?;
        road.vehicle_count = count;
        road.refresh();
        Ok(())
    }

    /// Nearest node by squared coordinate distance; first node wins ties
    pub fn nearest_node(&self, point: &GeoPoint) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;
        for node in self.graph.node_weights() {
            let distance = node.position.squared_distance(point);
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((node.id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Nearest edge by distance to its midpoint; first edge wins ties
    pub fn nearest_edge(&self, point: &GeoPoint) -> Option<EdgeId> {
        let mut best: Option<(EdgeId, f64)> = None;
        for edge in self.graph.edge_weights() {
            let Some((start, end)) = self.endpoints(edge.id) else {
                continue;
            };
            let distance = start.midpoint(&end).squared_distance(point);
            if best.is_none_or(|(_, best_distance)| distance < best_distance) {
                best = Some((edge.id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Positions of an edge's source and target
    pub fn endpoints(&self, edge: EdgeId) -> Option<(GeoPoint, GeoPoint)> {
        let road = self.edge(edge)?;
        Some((self.position(road.source)?, self.position(road.target)?))
    }

    /// The cheapest edge from `from` to `to`, if the two are adjacent
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<EdgeId> {
        if !self.contains_node(from) {
            return None;
        }
        self.graph
            .edges(NodeIndex::from(from))
            .filter(|edge| NodeId::from(edge.target()) == to)
            .min_by(|a, b| a.weight().travel_time.total_cmp(&b.weight().travel_time))
            .map(|edge| EdgeId::from(edge.id()))
    }

    pub fn outgoing_edges(&self, node: NodeId) -> Vec<EdgeId> {
        self.edges_directed(node, Direction::Outgoing)
    }

    pub fn incoming_edges(&self, node: NodeId) -> Vec<EdgeId> {
        self.edges_directed(node, Direction::Incoming)
    }

    fn edges_directed(&self, node: NodeId, direction: Direction) -> Vec<EdgeId> {
        if !self.contains_node(node) {
            return Vec::new();
        }
        // petgraph walks adjacency lists newest-first; report construction order.
        let mut edges: Vec<EdgeId> = self
            .graph
            .edges_directed(node.into(), direction)
            .map(|edge| EdgeId::from(edge.id()))
            .collect();
        edges.sort();
        edges
    }

    /// Effective congestion of every edge
    pub fn congestion_map(&self) -> BTreeMap<EdgeId, f64> {
        self.graph
            .edge_weights()
            .map(|edge| (edge.id, edge.congestion))
            .collect()
    }

    /// Mean effective congestion across all edges (0 for an empty network)
    pub fn average_congestion(&self) -> f64 {
        let count = self.graph.edge_count();
        if count == 0 {
            return 0.0;
        }
        self.graph.edge_weights().map(|e| e.congestion).sum::<f64>() / count as f64
    }
}
