use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use city_traffic::simulation::{
    Command, ControlMode, GridTopology, RoutingAlgorithm, SimConfig, SimSnapshot, SimWorld,
    SimulationRunner,
};

#[derive(Parser)]
#[command(name = "city_traffic")]
#[command(about = "Headless city traffic simulation over a synthetic street grid")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Simulated seconds per tick
    #[arg(long, default_value = "0.1")]
    delta: f64,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Grid rows
    #[arg(long, default_value = "10")]
    rows: usize,

    /// Grid columns
    #[arg(long, default_value = "10")]
    cols: usize,

    /// Maximum number of concurrent vehicles
    #[arg(long, default_value = "50")]
    vehicles: usize,

    /// Routing algorithm (dijkstra or a_star)
    #[arg(long, default_value = "a_star")]
    algorithm: RoutingAlgorithm,

    /// Traffic light control mode (auto, manual or optimized)
    #[arg(long, default_value = "auto")]
    signal_mode: ControlMode,

    /// Print the final snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Tick on the background runner in wall-clock time instead of as fast as possible
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn,city_traffic=info"))
        .init();

    let cli = Cli::parse();

    let grid = GridTopology {
        rows: cli.rows,
        cols: cli.cols,
        ..GridTopology::default()
    };
    let config = SimConfig {
        max_vehicles: cli.vehicles,
        routing_algorithm: cli.algorithm,
        signal_mode: cli.signal_mode,
        tick_interval: Duration::from_secs_f64(cli.delta.max(0.001)),
        seed: cli.seed,
        ..SimConfig::default()
    };

    let world = SimWorld::from_source(&grid, config).context("failed to build the simulation")?;

    let snapshot = if cli.realtime {
        run_realtime(world, cli.ticks)?
    } else {
        run_headless(world, cli.ticks, cli.delta)
    };

    if cli.json {
        let json = serde_json::to_string_pretty(snapshot.as_ref()).context("failed to serialize snapshot")?;
        println!("{json}");
    }
    Ok(())
}

/// Step the world directly, logging a summary every simulated second
fn run_headless(mut world: SimWorld, ticks: u32, delta: f64) -> std::sync::Arc<SimSnapshot> {
    info!("Running {} ticks of {}s", ticks, delta);
    world.start();

    let ticks_per_second = (1.0 / delta).ceil().max(1.0) as u32;
    for tick in 1..=ticks {
        let report = world.step(delta);
        for vehicle in &report.arrived {
            info!(
                "{:?} {:?} arrived after {:.1}s ({} reroutes)",
                vehicle.kind,
                vehicle.id,
                report.time - vehicle.departed_at,
                vehicle.reroute_count
            );
        }
        if tick % ticks_per_second == 0 {
            world.log_summary();
        }
    }

    world.stop();
    world.log_summary();
    world.snapshot()
}

/// Let the background runner tick for as long as the run would take in real time
fn run_realtime(world: SimWorld, ticks: u32) -> Result<std::sync::Arc<SimSnapshot>> {
    let cadence = world.config().tick_interval;
    let runner = SimulationRunner::spawn(world, cadence);
    runner.execute(Command::Start)?.context("failed to start the simulation")?;

    std::thread::sleep(cadence * ticks);

    runner.pause()?.context("failed to stop the simulation")?;
    let snapshot = runner.snapshot();
    let world = runner.shutdown().context("simulation thread did not exit cleanly")?;
    world.log_summary();
    Ok(snapshot)
}
