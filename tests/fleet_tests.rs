//! Vehicle spawning, movement and rerouting

mod common;

use city_traffic::simulation::{
    EdgeId, EdgeSpec, FleetManager, NodeId, ReasonCode, RoadNetwork, RouteRequest, Router, RoutingAlgorithm,
    SimError, Topology, VehicleKind, VehicleStatus, MIN_SPEED_KPH,
};
use common::{diamond, disconnected, grid, line, network, ring, EDGE_TIME_SECS};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn request<'a>(network: &'a RoadNetwork, router: &'a Router, now: f64) -> RouteRequest<'a> {
    RouteRequest {
        network,
        router,
        algorithm: RoutingAlgorithm::AStar,
        now,
    }
}

#[test]
fn test_vehicle_on_ring_arrives_after_two_edges() {
    let network = network(&ring(5));
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(1);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(2)), VehicleKind::Car)
        .unwrap();
    let vehicle = fleet.get(id).unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Moving);
    assert_eq!(vehicle.route, vec![EdgeId(0), EdgeId(1)]);

    let total = 2.0 * EDGE_TIME_SECS;
    let mut now = 0.0;
    for _ in 0..3 {
        now += 0.25 * total;
        assert!(fleet.advance(&network, 0.25 * total, now).is_empty());
    }
    let vehicle = fleet.get(id).unwrap();
    assert_eq!(vehicle.route_progress, 1);
    assert_eq!(vehicle.current_node, NodeId(1));
    assert!((vehicle.edge_progress - 0.5).abs() < 1e-9);

    now += 0.3 * total;
    let arrived = fleet.advance(&network, 0.3 * total, now);
    assert_eq!(arrived.len(), 1);
    assert_eq!(arrived[0].id, id);
    assert_eq!(arrived[0].status, VehicleStatus::Arrived);
    assert_eq!(arrived[0].route_progress, 2);
    assert_eq!(arrived[0].current_node, NodeId(2));
    assert_eq!(arrived[0].position, network.position(NodeId(2)).unwrap());

    assert!(fleet.get(id).is_none());
    assert_eq!(fleet.stats().completed, 1);
    assert!(fleet.advance(&network, 1.0, now + 1.0).is_empty());
    assert_eq!(fleet.stats().completed, 1);
}

#[test]
fn test_leftover_time_carries_onto_next_edge() {
    let network = network(&line(4));
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(2);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(3)), VehicleKind::Bus)
        .unwrap();
    fleet.advance(&network, 1.5 * EDGE_TIME_SECS, 1.5 * EDGE_TIME_SECS);

    let vehicle = fleet.get(id).unwrap();
    assert_eq!(vehicle.route_progress, 1);
    assert!((vehicle.edge_progress - 0.5).abs() < 1e-9);
    assert_eq!(vehicle.current_edge(), Some(EdgeId(1)));

    let (start, end) = network.endpoints(EdgeId(1)).unwrap();
    let midpoint = start.midpoint(&end);
    assert!(vehicle.position.squared_distance(&midpoint) < 1e-12);
    assert!((vehicle.eta - 3.0 * EDGE_TIME_SECS).abs() < 1e-6);
}

#[test]
fn test_speed_depends_on_congestion() {
    let mut network = network(&line(3));
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(3);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(2)), VehicleKind::Truck)
        .unwrap();
    let base = fleet.get(id).unwrap().base_speed_kph;
    assert!((28.0..42.0).contains(&base));

    fleet.advance(&network, 1.0, 1.0);
    assert!((fleet.get(id).unwrap().speed_kph - base).abs() < 1e-9);

    network.update_congestion(EdgeId(0), 1.0).unwrap();
    fleet.advance(&network, 1.0, 2.0);
    let speed = fleet.get(id).unwrap().speed_kph;
    assert!((speed - (base * 0.2).max(MIN_SPEED_KPH)).abs() < 1e-9);
}

#[test]
fn test_random_endpoints_are_distinct() {
    let network = network(&grid(3, 3));
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(4);

    for _ in 0..50 {
        let id = fleet
            .spawn(request(&network, &router, 0.0), &mut rng, None, None, VehicleKind::Car)
            .unwrap();
        let vehicle = fleet.get(id).unwrap();
        assert_ne!(vehicle.origin, vehicle.destination);
        assert_eq!(vehicle.status, VehicleStatus::Moving);
        assert!((40.0..60.0).contains(&vehicle.base_speed_kph));
    }
    assert_eq!(fleet.stats().spawned, 50);
}

#[test]
fn test_spawn_with_only_destination_picks_another_origin() {
    let network = network(&ring(4));
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(12);

    for _ in 0..200 {
        let id = fleet
            .spawn(request(&network, &router, 0.0), &mut rng, None, Some(NodeId(2)), VehicleKind::Car)
            .unwrap();
        let vehicle = fleet.get(id).unwrap();
        assert_ne!(vehicle.origin, NodeId(2));
        assert_eq!(vehicle.destination, NodeId(2));
    }
    assert_eq!(fleet.stats().spawned, 200);
}

#[test]
fn test_spawn_errors() {
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(5);

    let mut single = Topology::empty();
    single.add_node(0.0, 0.0);
    let tiny = network(&single);
    let err = fleet
        .spawn(request(&tiny, &router, 0.0), &mut rng, None, None, VehicleKind::Car)
        .unwrap_err();
    assert!(matches!(err, SimError::NoTarget(_)));
    assert_eq!(err.reason_code(), ReasonCode::NotFound);

    let ring = network(&ring(4));
    let err = fleet
        .spawn(request(&ring, &router, 0.0), &mut rng, Some(NodeId(1)), Some(NodeId(1)), VehicleKind::Car)
        .unwrap_err();
    assert_eq!(err.reason_code(), ReasonCode::InvalidArgument);

    let err = fleet
        .spawn(request(&ring, &router, 0.0), &mut rng, Some(NodeId(9)), None, VehicleKind::Car)
        .unwrap_err();
    assert_eq!(err, SimError::NodeNotFound(NodeId(9)));
    assert!(fleet.is_empty());
}

#[test]
fn test_unreachable_destination_spawns_stuck() {
    let network = network(&disconnected());
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(6);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(3)), VehicleKind::Car)
        .unwrap();
    let vehicle = fleet.get(id).unwrap();
    assert_eq!(vehicle.status, VehicleStatus::Stuck);
    assert_eq!(vehicle.current_edge(), None);

    assert!(fleet.advance(&network, 10.0, 10.0).is_empty());
    assert_eq!(fleet.count_with_status(VehicleStatus::Stuck), 1);
    assert_eq!(fleet.retry_stuck(request(&network, &router, 10.0)), 0);
}

#[test]
fn test_occupancy_feeds_congestion() {
    let mut network = network(&ring(4));
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..3 {
        fleet
            .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(2)), VehicleKind::Car)
            .unwrap();
    }
    fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(2)), Some(NodeId(3)), VehicleKind::Car)
        .unwrap();

    let counts = fleet.recompute_occupancy(&mut network);
    assert_eq!(counts, vec![3, 0, 1, 0]);
    assert!((network.congestion(EdgeId(0)).unwrap() - 0.3).abs() < 1e-9);
    assert_eq!(network.edge(EdgeId(2)).unwrap().vehicle_count, 1);
}

#[test]
fn test_reroute_switches_to_alternative() {
    let mut network = network(&diamond());
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(8);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(3)), VehicleKind::Car)
        .unwrap();
    assert_eq!(fleet.get(id).unwrap().route, vec![EdgeId(0), EdgeId(1)]);

    // Nothing changed yet: the best route is the current one.
    assert!(!fleet.reroute(id, request(&network, &router, 0.0)).unwrap());
    assert_eq!(fleet.get(id).unwrap().reroute_count, 0);

    network.update_congestion(EdgeId(0), 0.9).unwrap();
    let rerouted = fleet.reroute_affected(&[EdgeId(0)], request(&network, &router, 0.0));
    assert_eq!(rerouted, 1);

    let vehicle = fleet.get(id).unwrap();
    assert_eq!(vehicle.reroute_count, 1);
    assert_eq!(vehicle.route, vec![EdgeId(2), EdgeId(3)]);
    assert_eq!(fleet.stats().reroutes, 1);
}

#[test]
fn test_reroute_affected_looks_three_edges_ahead() {
    // Five-edge line with a slower bypass straight from the first node to the last.
    let mut topology = line(6);
    topology.add_edge(EdgeSpec::new(NodeId(0), NodeId(5), 6000.0).with_speed(36.0));
    let mut network = network(&topology);
    let bypass = EdgeId(5);
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(13);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(5)), VehicleKind::Car)
        .unwrap();
    assert_eq!(
        fleet.get(id).unwrap().route,
        vec![EdgeId(0), EdgeId(1), EdgeId(2), EdgeId(3), EdgeId(4)]
    );

    // The fourth edge past the current one is out of sight.
    network.update_congestion(EdgeId(4), 0.9).unwrap();
    assert_eq!(fleet.reroute_affected(&[EdgeId(4)], request(&network, &router, 0.0)), 0);
    assert_eq!(fleet.get(id).unwrap().reroute_count, 0);
    network.update_congestion(EdgeId(4), 0.0).unwrap();

    // The third one is not.
    network.update_congestion(EdgeId(3), 0.9).unwrap();
    assert_eq!(fleet.reroute_affected(&[EdgeId(3)], request(&network, &router, 0.0)), 1);
    let vehicle = fleet.get(id).unwrap();
    assert_eq!(vehicle.reroute_count, 1);
    assert_eq!(vehicle.route, vec![bypass]);
}

#[test]
fn test_reroute_affected_ignores_unrelated_vehicles() {
    let mut network = network(&diamond());
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(9);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, Some(NodeId(0)), Some(NodeId(3)), VehicleKind::Car)
        .unwrap();
    network.update_congestion(EdgeId(3), 1.0).unwrap();
    assert_eq!(fleet.reroute_affected(&[EdgeId(3)], request(&network, &router, 0.0)), 0);
    assert_eq!(fleet.get(id).unwrap().reroute_count, 0);
}

#[test]
fn test_remove_does_not_count_completion() {
    let network = network(&ring(4));
    let router = Router::default();
    let mut fleet = FleetManager::default();
    let mut rng = StdRng::seed_from_u64(10);

    let id = fleet
        .spawn(request(&network, &router, 0.0), &mut rng, None, None, VehicleKind::Bus)
        .unwrap();
    assert!(fleet.remove(id).is_ok());
    assert_eq!(fleet.remove(id).unwrap_err(), SimError::VehicleNotFound(id));
    assert_eq!(fleet.stats().completed, 0);
}
