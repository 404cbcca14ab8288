//! Data types produced by ingest and consumed by every downstream stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One 1 Hz sensor sample, owned by the lap that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub wheel_speed_kmh: f64,
    pub cadence_rpm: u16,
    pub power_w: f64,
    /// Cumulative wheel distance, meters. Lap-local: resets per lap and is
    /// only comparable across laps after start-point clustering confirms a
    /// shared anchor (see [`crate::align`]).
    pub distance_m: f64,
    pub altitude_m: f64,
    pub lat: f64,
    pub lon: f64,
    pub vibration_g: Option<f64>,
}

impl Record {
    pub fn speed_ms(&self) -> f64 {
        self.wheel_speed_kmh / 3.6
    }

    /// A record with no GPS fix yet reports `(0.0, 0.0)`, which callers use
    /// as the "no fix" sentinel when hunting for the first valid start point.
    pub fn has_gps_fix(&self) -> bool {
        self.lat != 0.0 || self.lon != 0.0
    }
}

/// Summary statistics for a lap's vibration samples, when the ingest source
/// reported them pre-aggregated rather than per-sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VibrationSummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub sample_count: u32,
}

/// Per-lap pressure metadata, independent of the sample stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapMetadata {
    pub lap_index: u32,
    pub front_pressure: f64,
    pub rear_pressure: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub vibration: Option<VibrationSummary>,
}

impl LapMetadata {
    /// Metadata for a lap that had samples but no metadata line in the
    /// source file: zeroed pressures, which is itself a downstream warning.
    pub fn missing(lap_index: u32) -> Self {
        Self {
            lap_index,
            front_pressure: 0.0,
            rear_pressure: 0.0,
            start_time: None,
            vibration: None,
        }
    }
}

/// Diagnostic counters surfaced alongside a parsed session so a caller can
/// report data quality without re-scanning the source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestDiagnostics {
    pub total_lines: usize,
    pub blank_lines: usize,
    pub malformed_lines: usize,
    pub sample_lines: usize,
    pub metadata_lines: usize,
    pub combined_lines: usize,
}

/// The fully parsed ingest source: one ordered record list and one metadata
/// entry per lap, keyed by lap index. Every lap index present in either
/// source has an entry in both maps.
#[derive(Debug, Clone, Default)]
pub struct IngestedSession {
    pub laps: BTreeMap<u32, Vec<Record>>,
    pub metadata: BTreeMap<u32, LapMetadata>,
    pub diagnostics: IngestDiagnostics,
}

impl IngestedSession {
    pub fn lap_indices(&self) -> Vec<u32> {
        self.laps.keys().copied().collect()
    }

    pub fn records(&self, lap_index: u32) -> &[Record] {
        self.laps.get(&lap_index).map(Vec::as_slice).unwrap_or(&[])
    }
}
