//! Growing-window constant-power segment detection.
//!
//! Fixed-width scanning fragments long stable efforts, so the detector grows
//! a window forward while it remains stable rather than scanning in fixed
//! chunks.

use std::collections::BTreeMap;

use crate::geodesy::coefficient_of_variation;
use crate::ingest::Record;
use crate::regression::RegressionPoint;

/// One stable-power window detected within a lap.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPowerSegment {
    pub lap_index: u32,
    pub segment_index: usize,
    pub pressure: f64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub avg_power: f64,
    pub power_cv: f64,
    pub avg_speed_kmh: f64,
    pub distance_m: f64,
    pub duration_s: usize,
    pub efficiency: f64,
    pub sample_count: usize,
    pub start_index: usize,
    pub end_index: usize,
}

/// Detect all constant-power segments within one lap's records.
///
/// `pressure` is the lap's rear pressure, carried onto every emitted
/// segment since detection runs per lap and a lap has exactly one pressure.
pub fn detect_segments(
    records: &[Record],
    pressure: f64,
    lap_index: u32,
    min_window: usize,
    segment_cv_threshold: f64,
) -> Vec<ConstantPowerSegment> {
    let mut segments = Vec::new();
    if records.len() < min_window {
        return segments;
    }

    let mut i = 0;
    let mut segment_index = 0;

    while i + min_window <= records.len() {
        let seed_end = i + min_window;
        let powers: Vec<f64> = records[i..seed_end]
            .iter()
            .map(|r| r.power_w)
            .filter(|p| *p > 0.0)
            .collect();

        if powers.len() < min_window / 2 || coefficient_of_variation(&powers) >= segment_cv_threshold
        {
            i += 1;
            continue;
        }

        // Grow the window forward while it remains stable.
        let mut end = seed_end;
        loop {
            if end >= records.len() {
                break;
            }
            let next_power = records[end].power_w;
            if next_power <= 0.0 {
                break;
            }
            let extended: Vec<f64> = records[i..=end]
                .iter()
                .map(|r| r.power_w)
                .filter(|p| *p > 0.0)
                .collect();
            if coefficient_of_variation(&extended) >= segment_cv_threshold {
                break;
            }
            end += 1;
        }

        segments.push(emit_segment(records, i, end, pressure, lap_index, segment_index));
        segment_index += 1;
        i = end;
    }

    segments
}

/// A cross-lap aligned point set: the laps a GPS/power zone cluster and
/// shared-interval intersection confirmed comparable, the representative
/// segment chosen for each, and the resulting (pressure, efficiency) pair
/// per lap.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedSegment {
    pub cluster_id: usize,
    pub interval_start_m: f64,
    pub interval_end_m: f64,
    pub laps: BTreeMap<u32, ConstantPowerSegment>,
    pub points: Vec<RegressionPoint>,
}

fn emit_segment(
    records: &[Record],
    start: usize,
    end: usize,
    pressure: f64,
    lap_index: u32,
    segment_index: usize,
) -> ConstantPowerSegment {
    let window = &records[start..end];
    let powers: Vec<f64> = window.iter().map(|r| r.power_w).filter(|p| *p > 0.0).collect();
    let avg_power = crate::geodesy::mean(&powers);
    let power_cv = coefficient_of_variation(&powers);

    let speeds: Vec<f64> = window.iter().map(|r| r.wheel_speed_kmh).collect();
    let avg_speed_kmh = crate::geodesy::mean(&speeds);

    let (start_lat, start_lon) = window
        .iter()
        .find(|r| r.has_gps_fix())
        .map(|r| (r.lat, r.lon))
        .unwrap_or((0.0, 0.0));

    let duration_s = window.len();
    let distance_m = (avg_speed_kmh / 3.6) * duration_s as f64;
    let efficiency = if avg_power > 0.0 {
        avg_speed_kmh / avg_power
    } else {
        0.0
    };

    ConstantPowerSegment {
        lap_index,
        segment_index,
        pressure,
        start_lat,
        start_lon,
        avg_power,
        power_cv,
        avg_speed_kmh,
        distance_m,
        duration_s,
        efficiency,
        sample_count: window.len(),
        start_index: start,
        end_index: end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(power: f64, speed_kmh: f64, lat: f64, lon: f64) -> Record {
        Record {
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            wheel_speed_kmh: speed_kmh,
            cadence_rpm: 85,
            power_w: power,
            distance_m: 0.0,
            altitude_m: 0.0,
            lat,
            lon,
            vibration_g: None,
        }
    }

    #[test]
    fn empty_lap_yields_no_segments() {
        assert!(detect_segments(&[], 65.0, 0, 10, 0.10).is_empty());
    }

    #[test]
    fn all_zero_power_yields_no_segments() {
        let records: Vec<Record> = (0..20).map(|_| record(0.0, 30.0, 48.85, 2.35)).collect();
        assert!(detect_segments(&records, 65.0, 0, 10, 0.10).is_empty());
    }

    #[test]
    fn stable_power_window_emits_one_segment() {
        let records: Vec<Record> = (0..15).map(|_| record(200.0, 30.0, 48.85, 2.35)).collect();
        let segments = detect_segments(&records, 65.0, 0, 10, 0.10);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].avg_power, 200.0);
        assert_eq!(segments[0].power_cv, 0.0);
        assert_eq!(segments[0].sample_count, 15);
    }

    #[test]
    fn unstable_power_is_skipped() {
        let mut records = Vec::new();
        for i in 0..30 {
            let power = if i % 2 == 0 { 100.0 } else { 400.0 };
            records.push(record(power, 30.0, 48.85, 2.35));
        }
        let segments = detect_segments(&records, 65.0, 0, 10, 0.10);
        assert!(segments.is_empty());
    }

    #[test]
    fn segments_do_not_overlap() {
        let mut records: Vec<Record> = (0..12).map(|_| record(200.0, 30.0, 48.85, 2.35)).collect();
        records.extend((0..12).map(|_| record(250.0, 32.0, 48.86, 2.36)));
        let segments = detect_segments(&records, 65.0, 0, 10, 0.10);
        for pair in segments.windows(2) {
            assert!(pair[0].end_index <= pair[1].start_index);
        }
    }
}
