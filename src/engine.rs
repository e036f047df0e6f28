// src/engine.rs - Public engine: configure, start/stop, streaming consumers, snapshots
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::motion::{RandomSource, StepSource};
use crate::simulator::clock::{Clock, MonotonicClock};
use crate::simulator::{Event, Sample, SessionHistory, Simulation, SimulationState};
use crate::telemetry::{self, ConsumerResult, Telemetry, TelemetryEmitter};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("simulation is already running")]
    AlreadyRunning,
    #[error("simulation is not running")]
    NotRunning,
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("simulation task failed: {0}")]
    Runtime(String),
}

/// Final state and history of a stopped run.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub state: SimulationState,
    pub history: SessionHistory,
    pub ticks: u64,
}

/// Owns the simulation task and its channels.
///
/// Consumers only ever see copies: samples and events through the telemetry
/// stream, state through [`Engine::snapshot`].
pub struct Engine {
    config: Config,
    telemetry: TelemetryEmitter,
    state_rx: watch::Receiver<SimulationState>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    run: Option<JoinHandle<SessionReport>>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let (_, state_rx) = watch::channel(SimulationState::new());
        Ok(Self {
            config,
            telemetry: TelemetryEmitter::default(),
            state_rx,
            shutdown_tx: None,
            run: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Replace the configuration. Takes effect at the next `start()`.
    pub fn configure(&mut self, config: Config) -> Result<(), ConfigError> {
        config.validate()?;
        if self.is_running() {
            tracing::info!("Configuration updated; applies to the next session");
        }
        self.config = config;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Start a run drawing steps from the configured seed (or entropy).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let source = RandomSource::from_seed_option(self.config.simulation.seed);
        self.start_with_source(Box::new(source))
    }

    /// Start a run with an explicit step source.
    pub fn start_with_source(&mut self, source: Box<dyn StepSource>) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        if self.run.take().is_some() {
            tracing::debug!("Discarding report of previous, unjoined run");
        }

        let simulation = Simulation::with_source(self.config.clone(), source)?;
        let (state_tx, state_rx) = watch::channel(simulation.state().clone());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let telemetry = self.telemetry.clone();
        self.run = Some(tokio::spawn(run_loop(simulation, telemetry, state_tx, shutdown_rx)));
        self.state_rx = state_rx;
        self.shutdown_tx = Some(shutdown_tx);
        tracing::info!("Simulation started");
        Ok(())
    }

    /// Request termination. The run ends within one tick; safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(());
        }
    }

    /// Wait for the current run to finish and collect its report.
    pub async fn join(&mut self) -> Result<SessionReport, EngineError> {
        let handle = self.run.take().ok_or(EngineError::NotRunning)?;
        let report = handle.await.map_err(|e| EngineError::Runtime(e.to_string()));
        self.shutdown_tx = None;
        report
    }

    /// `stop()` followed by `join()`.
    pub async fn shutdown(&mut self) -> Result<SessionReport, EngineError> {
        self.stop();
        self.join().await
    }

    pub fn snapshot(&self) -> SimulationState {
        self.state_rx.borrow().clone()
    }

    /// Raw telemetry stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    /// Register a sample consumer. Runs on its own task until the engine is dropped.
    pub fn on_sample<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnMut(Sample) -> ConsumerResult + Send + 'static,
    {
        telemetry::sample_consumer(self.subscribe(), callback)
    }

    /// Register an event consumer. Runs on its own task until the engine is dropped.
    pub fn on_event<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnMut(Event) -> ConsumerResult + Send + 'static,
    {
        telemetry::event_consumer(self.subscribe(), callback)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    mut simulation: Simulation,
    telemetry: TelemetryEmitter,
    state_tx: watch::Sender<SimulationState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> SessionReport {
    let clock = MonotonicClock::new();
    let dwell_secs = simulation.sequencer().dwell().as_secs_f64();
    let mut ticks = 0u64;
    loop {
        let tick = simulation.tick(clock.now());
        ticks += 1;
        telemetry.publish(&tick, simulation.state(), dwell_secs);
        state_tx.send_replace(simulation.state().clone());

        let pause = simulation.next_pause(clock.now());
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => {
                tracing::info!("Simulation loop shutting down");
                break;
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }

    simulation.halt();
    state_tx.send_replace(simulation.state().clone());
    telemetry.emit(Telemetry::Stopped);
    let (state, history) = simulation.into_parts();
    SessionReport {
        state,
        history,
        ticks,
    }
}
