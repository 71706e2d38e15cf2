//! Background scheduler that owns a [`SimWorld`] on its own thread
//!
//! The runner ticks at a fixed wall-clock cadence while the simulation is
//! started. Commands arrive over a channel and are applied at the next tick
//! boundary, paused or not, each answered on its own reply channel. After
//! every boundary a fresh [`SimSnapshot`] is swapped into a shared slot that
//! readers can clone without blocking the tick.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use thiserror::Error;

use super::snapshot::SimSnapshot;
use super::types::{ControlMode, RoutingAlgorithm};
use super::world::{Command, CommandResult, SettingsUpdate, SimWorld};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("simulation runner has shut down")]
pub struct RunnerClosed;

enum Control {
    Command(Command, Sender<CommandResult>),
    /// One tick of the given simulated seconds, even while stopped
    Step(f64, Sender<u64>),
    Shutdown,
}

type SnapshotSlot = Arc<RwLock<Arc<SimSnapshot>>>;

/// Handle to a simulation running on a background thread
pub struct SimulationRunner {
    control: Sender<Control>,
    snapshot: SnapshotSlot,
    thread: Option<JoinHandle<SimWorld>>,
}

impl SimulationRunner {
    /// Move `world` onto a new thread ticking every `cadence`
    pub fn spawn(world: SimWorld, cadence: Duration) -> Self {
        let (control, inbox) = mpsc::channel();
        let snapshot: SnapshotSlot = Arc::new(RwLock::new(world.snapshot()));
        let slot = Arc::clone(&snapshot);

        let thread = thread::Builder::new()
            .name("traffic-sim".to_string())
            .spawn(move || run(world, inbox, slot, cadence))
            .ok();
        if thread.is_none() {
            warn!("Failed to spawn the simulation thread");
        }

        Self {
            control,
            snapshot,
            thread,
        }
    }

    /// Spawn with the cadence configured on the world
    pub fn spawn_with_config(world: SimWorld) -> Self {
        let cadence = world.config().tick_interval;
        Self::spawn(world, cadence)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<SimSnapshot> {
        let guard = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Queue a command; the reply arrives once the next tick boundary applies it
    pub fn send(&self, command: Command) -> Result<Receiver<CommandResult>, RunnerClosed> {
        let (reply, result) = mpsc::channel();
        self.control
            .send(Control::Command(command, reply))
            .map_err(|_| RunnerClosed)?;
        Ok(result)
    }

    /// Queue a command and wait for its result
    pub fn execute(&self, command: Command) -> Result<CommandResult, RunnerClosed> {
        self.send(command)?.recv().map_err(|_| RunnerClosed)
    }

    pub fn start(&self) -> Result<CommandResult, RunnerClosed> {
        self.execute(Command::Start)
    }

    /// Stop ticking; commands are still applied while paused
    pub fn pause(&self) -> Result<CommandResult, RunnerClosed> {
        self.execute(Command::Stop)
    }

    pub fn update_settings(
        &self,
        speed_multiplier: Option<f64>,
        routing_algorithm: Option<RoutingAlgorithm>,
        signal_mode: Option<ControlMode>,
    ) -> Result<CommandResult, RunnerClosed> {
        self.execute(Command::UpdateSettings(SettingsUpdate {
            speed_multiplier,
            routing_algorithm,
            signal_mode,
        }))
    }

    /// Run a single tick of `delta_secs` and wait for it; returns the tick number
    pub fn step(&self, delta_secs: f64) -> Result<u64, RunnerClosed> {
        let (reply, result) = mpsc::channel();
        self.control
            .send(Control::Step(delta_secs, reply))
            .map_err(|_| RunnerClosed)?;
        result.recv().map_err(|_| RunnerClosed)
    }

    /// Stop the thread after its current tick and hand the world back
    pub fn shutdown(mut self) -> Option<SimWorld> {
        self.join()
    }

    fn join(&mut self) -> Option<SimWorld> {
        let thread = self.thread.take()?;
        // A closed channel means the thread is already on its way out.
        let _ = self.control.send(Control::Shutdown);
        match thread.join() {
            Ok(world) => Some(world),
            Err(_) => {
                warn!("Simulation thread panicked");
                None
            }
        }
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        self.join();
    }
}

fn run(mut world: SimWorld, inbox: Receiver<Control>, slot: SnapshotSlot, cadence: Duration) -> SimWorld {
    info!("Simulation runner started, ticking every {:?}", cadence);
    let mut queued: Vec<(Command, Sender<CommandResult>)> = Vec::new();
    let mut next_tick = Instant::now() + cadence;

    loop {
        let timeout = next_tick.saturating_duration_since(Instant::now());
        match inbox.recv_timeout(timeout) {
            Ok(Control::Command(command, reply)) => {
                queued.push((command, reply));
                continue;
            }
            Ok(Control::Step(delta, reply)) => {
                apply_queued(&mut world, &mut queued, &slot);
                let report = world.step(delta);
                publish(&world, &slot);
                let _ = reply.send(report.tick);
                continue;
            }
            Ok(Control::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        next_tick += cadence;
        apply_queued(&mut world, &mut queued, &slot);
        if world.is_running() {
            let delta = cadence.as_secs_f64() * world.config().speed_multiplier;
            world.step(delta);
        }
        publish(&world, &slot);

        // Fell behind; skip the missed boundaries instead of bursting.
        let now = Instant::now();
        if next_tick < now {
            next_tick = now + cadence;
        }
    }

    apply_queued(&mut world, &mut queued, &slot);
    info!("Simulation runner stopped after {} ticks", world.tick_count());
    world
}

/// Apply queued commands and publish before replying, so a caller that
/// got its reply also sees the effect in the shared snapshot
fn apply_queued(
    world: &mut SimWorld,
    queued: &mut Vec<(Command, Sender<CommandResult>)>,
    slot: &SnapshotSlot,
) {
    if queued.is_empty() {
        return;
    }
    let replies: Vec<(Sender<CommandResult>, CommandResult)> = queued
        .drain(..)
        .map(|(command, reply)| (reply, world.execute(command)))
        .collect();
    world.publish();
    publish(world, slot);

    for (reply, result) in replies {
        if reply.send(result).is_err() {
            debug!("Command sender went away before its reply");
        }
    }
}

fn publish(world: &SimWorld, slot: &SnapshotSlot) {
    let snapshot = world.snapshot();
    match slot.write() {
        Ok(mut guard) => *guard = snapshot,
        Err(poisoned) => *poisoned.into_inner() = snapshot,
    }
}
