// src/telemetry.rs - Fire-and-forget telemetry stream and callback consumers
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender, error::RecvError};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::simulator::{Event, Sample, SimulationState, Tick};

/// Default number of messages buffered per subscriber before it starts lagging.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Result type for consumer callbacks. Errors are logged, never propagated.
pub type ConsumerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Telemetry {
    Sample(Sample),
    Event(Event),
    /// Holding at `target` for `duration` seconds.
    Dwell {
        elapsed_time: f64,
        target: f64,
        duration: f64,
    },
    /// Session duration elapsed; history and counters restarted.
    SessionReset { session_id: Uuid },
    Stopped,
}

/// Publishes tick results to any number of subscribers.
///
/// Sending never blocks: with no subscribers messages are dropped, and a
/// subscriber that falls more than the channel capacity behind loses the
/// oldest messages.
#[derive(Debug, Clone)]
pub struct TelemetryEmitter {
    sender: Sender<Telemetry>,
}

impl TelemetryEmitter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<Telemetry> {
        self.sender.subscribe()
    }

    pub fn emit(&self, message: Telemetry) {
        let _ = self.sender.send(message);
    }

    /// Emit everything one tick produced: sample, events, dwell signal, reset.
    pub fn publish(&self, tick: &Tick, state: &SimulationState, dwell_secs: f64) {
        if let Some(sample) = tick.sample() {
            self.emit(Telemetry::Sample(*sample));
        }
        for event in tick.events() {
            self.emit(Telemetry::Event(event));
        }
        // A boundary tick has already reset elapsed time; report when the hold began.
        if let Some(reached) = tick.reached() {
            self.emit(Telemetry::Dwell {
                elapsed_time: reached.elapsed_time,
                target: state.target,
                duration: dwell_secs,
            });
        }
        if tick.session_reset {
            self.emit(Telemetry::SessionReset {
                session_id: state.session_id,
            });
        }
    }
}

impl Default for TelemetryEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Drive `callback` with every message from `receiver` on a separate task.
///
/// Callback errors and panics are logged and the consumer keeps running.
/// The task ends when the emitter is dropped.
pub fn spawn_consumer<F>(mut receiver: Receiver<Telemetry>, name: &'static str, mut callback: F) -> JoinHandle<()>
where
    F: FnMut(Telemetry) -> ConsumerResult + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let message = match receiver.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("{} consumer lagged, {} messages dropped", name, skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("{} consumer failed: {}", name, e),
                Err(_) => tracing::warn!("{} consumer panicked", name),
            }
        }
        tracing::debug!("{} consumer finished", name);
    })
}

/// Consumer that only sees samples.
pub fn sample_consumer<F>(receiver: Receiver<Telemetry>, mut callback: F) -> JoinHandle<()>
where
    F: FnMut(Sample) -> ConsumerResult + Send + 'static,
{
    spawn_consumer(receiver, "sample", move |message| match message {
        Telemetry::Sample(sample) => callback(sample),
        _ => Ok(()),
    })
}

/// Consumer that only sees reached/correction events.
pub fn event_consumer<F>(receiver: Receiver<Telemetry>, mut callback: F) -> JoinHandle<()>
where
    F: FnMut(Event) -> ConsumerResult + Send + 'static,
{
    spawn_consumer(receiver, "event", move |message| match message {
        Telemetry::Event(event) => callback(event),
        _ => Ok(()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{EventKind, TickOutcome};
    use std::sync::{Arc, Mutex};

    fn sample(t: f64) -> Sample {
        Sample {
            elapsed_time: t,
            position: t,
            velocity: 1.0,
            absolute_error: 0.0,
            correction_flag: false,
            correction_magnitude: 0.0,
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let emitter = TelemetryEmitter::new(4);
        emitter.emit(Telemetry::Stopped);
    }

    #[tokio::test]
    async fn publish_orders_sample_events_and_dwell() {
        let emitter = TelemetryEmitter::new(16);
        let mut rx = emitter.subscribe();
        let reached = Event {
            kind: EventKind::Reached,
            elapsed_time: 1.0,
            value: 6.35,
        };
        let tick = Tick {
            outcome: TickOutcome::Moved {
                sample: sample(1.0),
                correction: None,
                reached: Some(reached),
            },
            session_reset: false,
        };
        emitter.publish(&tick, &SimulationState::new(), 2.0);
        assert_eq!(rx.recv().await.unwrap(), Telemetry::Sample(sample(1.0)));
        assert_eq!(rx.recv().await.unwrap(), Telemetry::Event(reached));
        assert!(matches!(rx.recv().await.unwrap(), Telemetry::Dwell { duration, .. } if duration == 2.0));
    }

    #[tokio::test]
    async fn dwell_on_boundary_tick_keeps_reached_time() {
        let emitter = TelemetryEmitter::new(16);
        let mut rx = emitter.subscribe();
        let reached = Event {
            kind: EventKind::Reached,
            elapsed_time: 3.0,
            value: 3.5,
        };
        let tick = Tick {
            outcome: TickOutcome::Moved {
                sample: sample(3.0),
                correction: None,
                reached: Some(reached),
            },
            session_reset: true,
        };
        let mut state = SimulationState::new();
        state.target = 3.5;
        emitter.publish(&tick, &state, 2.0);

        let mut dwell = None;
        let mut reset = false;
        while let Ok(message) = rx.try_recv() {
            match message {
                Telemetry::Dwell { elapsed_time, target, .. } => dwell = Some((elapsed_time, target)),
                Telemetry::SessionReset { .. } => reset = true,
                _ => {}
            }
        }
        assert_eq!(dwell, Some((3.0, 3.5)));
        assert!(reset);
    }

    #[tokio::test]
    async fn failing_callbacks_do_not_stop_the_consumer() {
        let emitter = TelemetryEmitter::new(16);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_task = seen.clone();
        let handle = sample_consumer(emitter.subscribe(), move |s| {
            seen_in_task.lock().unwrap().push(s.elapsed_time);
            if s.elapsed_time == 1.0 {
                return Err("render failed".into());
            }
            if s.elapsed_time == 2.0 {
                panic!("consumer bug");
            }
            Ok(())
        });
        for t in [1.0, 2.0, 3.0] {
            emitter.emit(Telemetry::Sample(sample(t)));
        }
        drop(emitter);
        handle.await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
