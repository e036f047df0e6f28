use std::sync::{Arc, Mutex};
use std::time::Duration;

use encoder_sim::config::{Config, ConfigError};
use encoder_sim::engine::{Engine, EngineError};
use encoder_sim::motion::{FixedSource, Phase};
use encoder_sim::simulator::EventKind;
use encoder_sim::telemetry::Telemetry;
use tokio_test::{assert_err, assert_ok};

fn create_test_config() -> Config {
    let mut config = Config::default();
    config.simulation.sampling_interval = 0.5;
    config.simulation.backlash_enabled = false;
    config.waypoints.targets = Some(vec![0.0, 6.35]);
    config
}

#[tokio::test(start_paused = true)]
async fn test_start_stop_and_report() {
    let mut engine = Engine::new(create_test_config()).unwrap();
    assert_eq!(engine.snapshot().phase, Phase::Idle);
    assert_ok!(engine.start_with_source(Box::new(FixedSource::new(1.0, 0.0))));
    assert!(engine.is_running());

    tokio::time::sleep(Duration::from_millis(5250)).await;
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.phase, Phase::Holding);
    assert_eq!(snapshot.position, 6.35);
    assert_eq!(snapshot.waypoint_index, 1);

    engine.stop();
    engine.stop();
    let report = engine.join().await.unwrap();
    assert!(!engine.is_running());
    assert_eq!(report.state.phase, Phase::Idle);
    assert_eq!(report.history.samples.len(), 7);
    assert_eq!(report.history.reached.len(), 2);
    assert_eq!(engine.snapshot().phase, Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let mut engine = Engine::new(create_test_config()).unwrap();
    engine.start().unwrap();
    assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));
    engine.shutdown().await.unwrap();
    // A stopped engine can start a new session.
    assert_ok!(engine.start());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_join_without_run_is_not_running() {
    let mut engine = Engine::new(create_test_config()).unwrap();
    engine.stop();
    assert!(matches!(engine.join().await, Err(EngineError::NotRunning)));
}

#[test]
fn test_configure_rejects_invalid_values() {
    let mut engine = Engine::new(create_test_config()).unwrap();
    let mut bad = create_test_config();
    bad.simulation.sampling_interval = 0.0;
    assert!(matches!(engine.configure(bad), Err(ConfigError::InvalidSamplingInterval(_))));

    let mut bad = create_test_config();
    bad.simulation.pulses_per_revolution = 0;
    assert_err!(engine.configure(bad));
    assert_eq!(engine.config().simulation.sampling_interval, 0.5);

    let mut good = create_test_config();
    good.simulation.sampling_interval = 0.1;
    assert_ok!(engine.configure(good));
    assert_eq!(engine.config().simulation.sampling_interval, 0.1);
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_receive_samples_and_events() {
    let mut engine = Engine::new(create_test_config()).unwrap();
    let samples = Arc::new(Mutex::new(Vec::new()));
    let events = Arc::new(Mutex::new(Vec::new()));

    let sink = samples.clone();
    let sample_task = engine.on_sample(move |sample| {
        sink.lock().unwrap().push(sample);
        Ok(())
    });
    let sink = events.clone();
    let event_task = engine.on_event(move |event| {
        sink.lock().unwrap().push(event);
        Err("overlay renderer unavailable".into())
    });

    engine.start_with_source(Box::new(FixedSource::new(1.0, 0.0))).unwrap();
    tokio::time::sleep(Duration::from_millis(5250)).await;
    engine.shutdown().await.unwrap();
    drop(engine);
    sample_task.await.unwrap();
    event_task.await.unwrap();

    let samples = samples.lock().unwrap();
    assert_eq!(samples.len(), 7);
    assert_eq!(samples.last().unwrap().position, 6.35);
    let kinds: Vec<_> = events.lock().unwrap().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Reached, EventKind::Reached]);
}

#[tokio::test(start_paused = true)]
async fn test_stream_signals_dwell_and_stop() {
    let mut engine = Engine::new(create_test_config()).unwrap();
    let mut rx = engine.subscribe();
    engine.start().unwrap();

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, Telemetry::Event(e) if e.kind == EventKind::Reached));
    let second = rx.recv().await.unwrap();
    assert!(matches!(second, Telemetry::Dwell { target, duration, .. } if target == 0.0 && duration == 2.0));

    engine.shutdown().await.unwrap();
    let mut saw_stop = false;
    while let Ok(message) = rx.try_recv() {
        saw_stop |= message == Telemetry::Stopped;
    }
    assert!(saw_stop);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_dwell_ends_promptly() {
    let mut config = create_test_config();
    config.waypoints.dwell = 3600.0;
    let mut engine = Engine::new(config).unwrap();
    engine.start().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.snapshot().phase, Phase::Holding);

    let before = tokio::time::Instant::now();
    let report = engine.shutdown().await.unwrap();
    assert!(before.elapsed() < Duration::from_millis(500));
    assert!(report.history.samples.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_reset_is_streamed() {
    let mut config = create_test_config();
    config.simulation.session_duration = 3.0;
    let mut engine = Engine::new(config).unwrap();
    let mut rx = engine.subscribe();
    engine.start_with_source(Box::new(FixedSource::new(1.0, 0.0))).unwrap();
    tokio::time::sleep(Duration::from_millis(3250)).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.correction_count, 0);
    assert!(snapshot.elapsed_time < 0.5);
    engine.shutdown().await.unwrap();

    let mut resets = 0;
    while let Ok(message) = rx.try_recv() {
        if matches!(message, Telemetry::SessionReset { .. }) {
            resets += 1;
        }
    }
    assert_eq!(resets, 1);
}
