use std::time::Duration;

use encoder_sim::config::Config;
use encoder_sim::export::{export_events_csv, export_samples_csv, export_samples_jsonl};
use encoder_sim::motion::FixedSource;
use encoder_sim::simulator::Simulation;
use encoder_sim::simulator::clock::SimClock;

#[test]
fn test_export_session_history_to_files() {
    let mut config = Config::default();
    config.simulation.backlash_enabled = false;
    config.waypoints.targets = Some(vec![0.0, 6.2]);
    let mut sim = Simulation::with_source(config, Box::new(FixedSource::new(1.0, 0.0))).unwrap();
    sim.run_batch(&mut SimClock::new(), Duration::from_secs(6), |_, _| {});
    let history = sim.history().clone();
    assert_eq!(history.samples.len(), 6);

    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("samples.csv");
    let jsonl_path = dir.path().join("samples.jsonl");
    let events_path = dir.path().join("events.csv");
    export_samples_csv(&csv_path, &history).unwrap();
    export_samples_jsonl(&jsonl_path, &history).unwrap();
    export_events_csv(&events_path, &history).unwrap();

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let rows: Vec<_> = csv.lines().collect();
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[0], "Time,Position,Velocity,Error,Correction");
    assert_eq!(rows[1], "2.00,1.00,0.00,5.20,No");
    assert_eq!(rows[6], "4.50,6.20,2.40,0.00,Yes");

    let jsonl = std::fs::read_to_string(&jsonl_path).unwrap();
    assert_eq!(jsonl.lines().count(), 6);

    let events = std::fs::read_to_string(&events_path).unwrap();
    let kinds: Vec<_> = events.lines().skip(1).map(|l| l.split(',').next().unwrap()).collect();
    assert_eq!(kinds, vec!["reached", "correction", "reached"]);
}
