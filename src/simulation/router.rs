//! Path search over the live road network
//!
//! Costs are the edges' current `travel_time` in seconds, so every request
//! sees the congestion as it stands at call time. The router holds no state
//! between calls; each search allocates its own frontier and tables.
//!
//! # Heuristic
//!
//! A* uses the great-circle distance to the goal divided by the network's
//! fastest free-flow speed. That puts the estimate in seconds, the same unit
//! as the edge costs, and never overestimates: no edge can be crossed faster
//! than that speed, and congestion only makes edges slower.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::warn;
use ordered_float::OrderedFloat;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::Serialize;

use super::error::{SimError, SimResult};
use super::road_network::RoadNetwork;
use super::types::{EdgeId, NodeId, RoutingAlgorithm};

/// Default bound on node expansions per search
pub const DEFAULT_MAX_EXPANSIONS: usize = 100_000;

/// A path through the network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    /// Visited nodes, source first and destination last
    pub nodes: Vec<NodeId>,
    /// Edges between consecutive nodes; always one fewer than `nodes`
    pub edges: Vec<EdgeId>,
    /// Total travel time in seconds at the time of the search
    pub cost: f64,
}

impl Route {
    /// Source and destination coincide
    pub fn is_trivial(&self) -> bool {
        self.edges.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Router {
    max_expansions: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_EXPANSIONS)
    }
}

impl Router {
    pub fn new(max_expansions: usize) -> Self {
        Self {
            max_expansions: max_expansions.max(1),
        }
    }

    pub fn max_expansions(&self) -> usize {
        self.max_expansions
    }

    /// Find the cheapest route from `source` to `destination`
    ///
    /// Unreachable destinations (including searches that exhaust the
    /// expansion budget) yield [`SimError::NoPathExists`], never a partial
    /// route.
    pub fn find_path(
        &self,
        network: &RoadNetwork,
        source: NodeId,
        destination: NodeId,
        algorithm: RoutingAlgorithm,
    ) -> SimResult<Route> {
        let goal = network
            .position(destination)
            .ok_or(SimError::NodeNotFound(destination))?;
        if !network.contains_node(source) {
            return Err(SimError::NodeNotFound(source));
        }

        if source == destination {
            return Ok(Route {
                nodes: vec![source],
                edges: Vec::new(),
                cost: 0.0,
            });
        }

        let max_speed = network.max_free_flow_speed();
        let heuristic = |node: NodeId| -> f64 {
            match algorithm {
                RoutingAlgorithm::Dijkstra => 0.0,
                RoutingAlgorithm::AStar if max_speed > 0.0 => network
                    .position(node)
                    .map_or(0.0, |position| position.haversine_m(&goal) / max_speed),
                RoutingAlgorithm::AStar => 0.0,
            }
        };

        let graph = network.graph();
        let n = graph.node_count();
        let mut best_cost = vec![f64::INFINITY; n];
        let mut prev_edge: Vec<Option<EdgeId>> = vec![None; n];
        let mut settled = vec![false; n];

        // Min-heap on (priority, discovery sequence); the sequence number makes
        // equal-priority entries pop in the order they were discovered.
        let mut frontier: BinaryHeap<Reverse<(OrderedFloat<f64>, u64, usize)>> = BinaryHeap::new();
        let mut sequence: u64 = 0;

        best_cost[source.index()] = 0.0;
        frontier.push(Reverse((OrderedFloat(heuristic(source)), sequence, source.index())));

        let mut expansions = 0usize;
        while let Some(Reverse((_, _, index))) = frontier.pop() {
            if settled[index] {
                continue;
            }
            settled[index] = true;

            if index == destination.index() {
                return Ok(reconstruct(network, &prev_edge, source, destination, best_cost[index]));
            }

            expansions += 1;
            if expansions > self.max_expansions {
                warn!(
                    "Path search {} -> {} gave up after {} expansions",
                    source, destination, self.max_expansions
                );
                break;
            }

            let cost_here = best_cost[index];
            for edge in graph.edges(NodeIndex::new(index)) {
                let next = edge.target().index();
                if settled[next] {
                    continue;
                }
                let candidate = cost_here + edge.weight().travel_time;
                if candidate < best_cost[next] {
                    best_cost[next] = candidate;
                    prev_edge[next] = Some(EdgeId::from(edge.id()));
                    sequence += 1;
                    let priority = candidate + heuristic(NodeId(next));
                    frontier.push(Reverse((OrderedFloat(priority), sequence, next)));
                }
            }
        }

        Err(SimError::NoPathExists {
            from: source,
            to: destination,
        })
    }
}

fn reconstruct(
    network: &RoadNetwork,
    prev_edge: &[Option<EdgeId>],
    source: NodeId,
    destination: NodeId,
    cost: f64,
) -> Route {
    let mut edges = Vec::new();
    let mut nodes = vec![destination];
    let mut current = destination;

    while current != source {
        let Some(edge) = prev_edge[current.index()] else {
            break;
        };
        let Some(road) = network.edge(edge) else {
            break;
        };
        edges.push(edge);
        current = road.source;
        nodes.push(current);
    }

    edges.reverse();
    nodes.reverse();
    Route { nodes, edges, cost }
}
