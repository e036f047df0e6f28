//! Export of a session history: CSV table rows, JSON lines, and event overlays.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::simulator::{EventKind, Sample, SessionHistory};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of the sample table, formatted for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRow {
    #[serde(rename = "Time")]
    pub time: String,
    #[serde(rename = "Position")]
    pub position: String,
    #[serde(rename = "Velocity")]
    pub velocity: String,
    #[serde(rename = "Error")]
    pub error: String,
    #[serde(rename = "Correction")]
    pub correction: &'static str,
}

impl From<&Sample> for SampleRow {
    fn from(sample: &Sample) -> Self {
        Self {
            time: format!("{:.2}", sample.elapsed_time),
            position: format!("{:.2}", sample.position),
            velocity: format!("{:.2}", sample.velocity),
            error: format!("{:.2}", sample.absolute_error),
            correction: if sample.correction_flag { "Yes" } else { "No" },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EventRow {
    #[serde(rename = "Kind")]
    kind: &'static str,
    #[serde(rename = "Time")]
    time: f64,
    #[serde(rename = "Value")]
    value: f64,
}

/// Write samples as `Time,Position,Velocity,Error,Correction`.
pub fn write_samples_csv<W: Write>(writer: W, samples: &[Sample]) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for sample in samples {
        wtr.serialize(SampleRow::from(sample))?;
    }
    if samples.is_empty() {
        wtr.write_record(["Time", "Position", "Velocity", "Error", "Correction"])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write reached and correction events as `Kind,Time,Value`, in time order.
///
/// A correction and a reached event on the same tick keep tick order: correction first.
pub fn write_events_csv<W: Write>(writer: W, history: &SessionHistory) -> Result<(), ExportError> {
    let mut events: Vec<_> = history.corrections.iter().chain(history.reached.iter()).collect();
    events.sort_by(|a, b| a.elapsed_time.total_cmp(&b.elapsed_time));

    let mut wtr = csv::Writer::from_writer(writer);
    if events.is_empty() {
        wtr.write_record(["Kind", "Time", "Value"])?;
    }
    for event in events {
        wtr.serialize(EventRow {
            kind: match event.kind {
                EventKind::Reached => "reached",
                EventKind::Correction => "correction",
            },
            time: event.elapsed_time,
            value: event.value,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write one JSON object per sample, unformatted.
pub fn write_samples_jsonl<W: Write>(mut writer: W, samples: &[Sample]) -> Result<(), ExportError> {
    for sample in samples {
        serde_json::to_writer(&mut writer, sample)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_samples_csv(path: &Path, history: &SessionHistory) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_samples_csv(BufWriter::new(file), &history.samples)?;
    tracing::info!("CSV saved to {}", path.display());
    Ok(())
}

pub fn export_events_csv(path: &Path, history: &SessionHistory) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_events_csv(BufWriter::new(file), history)?;
    tracing::info!("Event CSV saved to {}", path.display());
    Ok(())
}

pub fn export_samples_jsonl(path: &Path, history: &SessionHistory) -> Result<(), ExportError> {
    let file = File::create(path)?;
    write_samples_jsonl(BufWriter::new(file), &history.samples)?;
    tracing::info!("JSONL saved to {}", path.display());
    Ok(())
}
