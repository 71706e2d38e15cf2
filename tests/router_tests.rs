//! Path search over the live network

mod common;

use city_traffic::simulation::{
    EdgeId, NodeId, ReasonCode, Router, RoutingAlgorithm, SimError,
};
use common::{diamond, disconnected, grid, line, network, ring, EDGE_TIME_SECS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALGORITHMS: [RoutingAlgorithm; 2] = [RoutingAlgorithm::Dijkstra, RoutingAlgorithm::AStar];

#[test]
fn test_unique_path_found_by_both_algorithms() {
    let network = network(&line(3));
    let router = Router::default();

    for algorithm in ALGORITHMS {
        let route = router.find_path(&network, NodeId(0), NodeId(2), algorithm).unwrap();
        assert_eq!(route.nodes, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(route.edges, vec![EdgeId(0), EdgeId(1)]);
        assert!((route.cost - 2.0 * EDGE_TIME_SECS).abs() < 1e-6);
    }
}

#[test]
fn test_disconnected_components_have_no_path() {
    let network = network(&disconnected());
    let router = Router::default();

    for algorithm in ALGORITHMS {
        let err = router.find_path(&network, NodeId(0), NodeId(3), algorithm).unwrap_err();
        assert_eq!(
            err,
            SimError::NoPathExists {
                from: NodeId(0),
                to: NodeId(3)
            }
        );
        assert_eq!(err.reason_code(), ReasonCode::NoPathExists);
    }
}

#[test]
fn test_one_way_streets_are_respected() {
    let network = network(&line(3));
    let result = Router::default().find_path(&network, NodeId(2), NodeId(0), RoutingAlgorithm::Dijkstra);
    assert!(matches!(result, Err(SimError::NoPathExists { .. })));
}

#[test]
fn test_same_source_and_destination_is_trivial_route() {
    let network = network(&ring(5));
    let route = Router::default()
        .find_path(&network, NodeId(3), NodeId(3), RoutingAlgorithm::AStar)
        .unwrap();
    assert!(route.is_trivial());
    assert_eq!(route.nodes, vec![NodeId(3)]);
    assert_eq!(route.cost, 0.0);
}

#[test]
fn test_unknown_nodes_are_not_found() {
    let network = network(&ring(5));
    let router = Router::default();
    assert_eq!(
        router.find_path(&network, NodeId(0), NodeId(50), RoutingAlgorithm::Dijkstra),
        Err(SimError::NodeNotFound(NodeId(50)))
    );
    assert_eq!(
        router.find_path(&network, NodeId(50), NodeId(0), RoutingAlgorithm::AStar),
        Err(SimError::NodeNotFound(NodeId(50)))
    );
}

#[test]
fn test_congestion_shifts_the_route() {
    let mut network = network(&diamond());
    let router = Router::default();

    let route = router.find_path(&network, NodeId(0), NodeId(3), RoutingAlgorithm::AStar).unwrap();
    assert_eq!(route.nodes, vec![NodeId(0), NodeId(1), NodeId(3)]);

    network.update_congestion(EdgeId(1), 0.9).unwrap();
    for algorithm in ALGORITHMS {
        let route = router.find_path(&network, NodeId(0), NodeId(3), algorithm).unwrap();
        assert_eq!(route.nodes, vec![NodeId(0), NodeId(2), NodeId(3)]);
        assert!((route.cost - 240.0).abs() < 1e-6);
    }
}

#[test]
fn test_astar_matches_dijkstra_cost_on_congested_grid() {
    let mut network = network(&grid(6, 6));
    let mut rng = StdRng::seed_from_u64(7);
    for index in 0..network.edge_count() {
        let level = rng.random_range(0.0..1.0);
        network.update_congestion(EdgeId(index), level).unwrap();
    }

    let router = Router::default();
    let nodes = network.node_count();
    for _ in 0..40 {
        let from = NodeId(rng.random_range(0..nodes));
        let to = NodeId(rng.random_range(0..nodes));
        let dijkstra = router.find_path(&network, from, to, RoutingAlgorithm::Dijkstra).unwrap();
        let astar = router.find_path(&network, from, to, RoutingAlgorithm::AStar).unwrap();
        assert!(
            (dijkstra.cost - astar.cost).abs() < 1e-6,
            "{from} -> {to}: dijkstra {} vs a* {}",
            dijkstra.cost,
            astar.cost
        );
        assert_eq!(astar.nodes.first(), Some(&from));
        assert_eq!(astar.nodes.last(), Some(&to));
        assert_eq!(astar.edges.len() + 1, astar.nodes.len());
    }
}

#[test]
fn test_route_edges_connect_consecutive_nodes() {
    let network = network(&grid(4, 5));
    let route = Router::default()
        .find_path(&network, NodeId(0), NodeId(19), RoutingAlgorithm::AStar)
        .unwrap();
    for (pair, edge) in route.nodes.windows(2).zip(&route.edges) {
        let road = network.edge(*edge).unwrap();
        assert_eq!((road.source, road.target), (pair[0], pair[1]));
    }
    let total: f64 = route.edges.iter().map(|e| network.travel_time(*e).unwrap()).sum();
    assert!((total - route.cost).abs() < 1e-6);
}

#[test]
fn test_expansion_budget_gives_up() {
    let network = network(&ring(20));
    let tight = Router::new(3);
    assert!(matches!(
        tight.find_path(&network, NodeId(0), NodeId(15), RoutingAlgorithm::Dijkstra),
        Err(SimError::NoPathExists { .. })
    ));
    assert!(tight
        .find_path(&network, NodeId(0), NodeId(2), RoutingAlgorithm::Dijkstra)
        .is_ok());
}
