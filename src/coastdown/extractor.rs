//! Coast-down window detection: locate the start of a gravity-only descent
//! and the point it ends at brake, turnaround, or flat run-out.

use crate::geodesy::haversine_distance;
use crate::ingest::Record;

const START_SPEED_THRESHOLD_MS: f64 = 0.3;
const PUSH_OFF_IGNORE_SECONDS: usize = 2;
const POWER_SPIKE_LOOKAHEAD_S: usize = 1;
const POWER_SPIKE_THRESHOLD_W: f64 = 80.0;

const BRAKE_DECEL_MS2: f64 = -1.25;
const BRAKE_DROP_FRACTION: f64 = 0.22;
const FLAT_SPEED_THRESHOLD_MS: f64 = 1.0;
const FLAT_COUNTER_LIMIT: u32 = 3;
const TURNAROUND_LOOKBACK: usize = 10;
const TURNAROUND_MIN_DISTANCE_M: f64 = 50.0;
const TURNAROUND_FRACTION: f64 = 0.5;

/// Raw coast-down detection output: the full record slice plus the indices
/// that demarcate the coasting window within it.
#[derive(Debug, Clone, PartialEq)]
pub struct CoastDescent {
    pub start_index: usize,
    pub end_index: usize,
}

/// Reasons a candidate coast-down window is rejected before it can become a
/// [`crate::coastdown::DescentSegment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    TooShort,
    AltitudeNeverDrops,
    InsufficientAltitudeDrop,
}

/// Find the confirmed start of the coasting window: first sustained
/// above-threshold speed, past the shove-off, with no nearby power spike.
pub fn find_start(records: &[Record]) -> Option<usize> {
    let speeds_ms: Vec<f64> = records.iter().map(Record::speed_ms).collect();
    let candidate = speeds_ms.iter().position(|&v| v > START_SPEED_THRESHOLD_MS)?;
    let mut i = candidate + PUSH_OFF_IGNORE_SECONDS;

    while i < records.len() {
        let lookback = i.saturating_sub(POWER_SPIKE_LOOKAHEAD_S);
        let lookahead = (i + POWER_SPIKE_LOOKAHEAD_S + 1).min(records.len());
        let has_spike = records[lookback..lookahead]
            .iter()
            .any(|r| r.power_w > POWER_SPIKE_THRESHOLD_W);
        if !has_spike {
            return Some(i);
        }
        i += 1;
    }

    None
}

/// Find the end of the coasting window, starting the scan at `start + 1`.
pub fn find_end(records: &[Record], start: usize) -> Option<usize> {
    let speeds_ms: Vec<f64> = records.iter().map(Record::speed_ms).collect();

    let mut flat_counter: u32 = 0;

    for i in (start + 1)..records.len() {
        // Braking: instantaneous deceleration, or a sharp drop versus the
        // fastest speed in the last 2 seconds.
        let delta = speeds_ms[i] - speeds_ms[i - 1];
        if delta <= BRAKE_DECEL_MS2 {
            return Some(i);
        }
        let window_start = i.saturating_sub(2);
        let max_recent = speeds_ms[window_start..i]
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        if max_recent.is_finite() && max_recent > 0.0 {
            let drop = (max_recent - speeds_ms[i]) / max_recent;
            if drop >= BRAKE_DROP_FRACTION {
                return Some(i);
            }
        }

        // Flat/uphill counter.
        let altitude_non_decreasing = records[i].altitude_m >= records[i - 1].altitude_m;
        let is_slow = speeds_ms[i] < FLAT_SPEED_THRESHOLD_MS;
        if altitude_non_decreasing {
            flat_counter += 1;
        }
        if is_slow {
            flat_counter += 1;
        }
        if !altitude_non_decreasing && !is_slow {
            flat_counter = 0;
        }
        if flat_counter >= FLAT_COUNTER_LIMIT {
            return Some(i);
        }

        // GPS turnaround.
        if i >= start + TURNAROUND_LOOKBACK {
            let start_record = &records[start];
            let current_distance =
                haversine_distance(start_record.lat, start_record.lon, records[i].lat, records[i].lon);
            let lookback_start = i - TURNAROUND_LOOKBACK;
            let max_distance = (lookback_start..i)
                .map(|j| haversine_distance(start_record.lat, start_record.lon, records[j].lat, records[j].lon))
                .fold(f64::NEG_INFINITY, f64::max);
            if max_distance > TURNAROUND_MIN_DISTANCE_M
                && current_distance < max_distance * TURNAROUND_FRACTION
            {
                return Some(i);
            }
        }
    }

    None
}

/// Validate a candidate coasting slice against the altitude-profile gates.
pub fn validate(
    records: &[Record],
    descent: &CoastDescent,
    min_altitude_drop_m: f64,
    max_altitude_error_rate: f64,
) -> Result<(), ValidationFailure> {
    let slice = &records[descent.start_index..descent.end_index];
    if slice.len() <= 3 {
        return Err(ValidationFailure::TooShort);
    }

    let mut non_dropping = 0usize;
    for pair in slice.windows(2) {
        if pair[1].altitude_m >= pair[0].altitude_m {
            non_dropping += 1;
        }
    }
    let error_rate = non_dropping as f64 / (slice.len() - 1) as f64;
    if error_rate > max_altitude_error_rate {
        return Err(ValidationFailure::AltitudeNeverDrops);
    }

    let total_drop = slice.first().unwrap().altitude_m - slice.last().unwrap().altitude_m;
    if total_drop < min_altitude_drop_m {
        return Err(ValidationFailure::InsufficientAltitudeDrop);
    }

    Ok(())
}

/// Run start/end detection and validation in sequence, returning a validated
/// descent window or `None` if any stage fails.
pub fn extract(
    records: &[Record],
    min_altitude_drop_m: f64,
    max_altitude_error_rate: f64,
) -> Option<CoastDescent> {
    let start = find_start(records)?;
    let end = find_end(records, start)?;
    let descent = CoastDescent {
        start_index: start,
        end_index: end,
    };
    validate(records, &descent, min_altitude_drop_m, max_altitude_error_rate).ok()?;
    Some(descent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(speed_kmh: f64, power: f64, altitude: f64, lat: f64, lon: f64) -> Record {
        Record {
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            wheel_speed_kmh: speed_kmh,
            cadence_rpm: 0,
            power_w: power,
            distance_m: 0.0,
            altitude_m: altitude,
            lat,
            lon,
            vibration_g: None,
        }
    }

    fn descending_run(len: usize, start_alt: f64) -> Vec<Record> {
        (0..len)
            .map(|i| record(25.0, 0.0, start_alt - i as f64 * 0.8, 48.85, 2.35))
            .collect()
    }

    #[test]
    fn finds_start_after_shove_off_and_power_spike() {
        let mut records = vec![record(0.0, 0.0, 100.0, 0.0, 0.0)];
        records.push(record(2.0, 300.0, 100.0, 0.0, 0.0)); // shove-off spike
        records.extend(descending_run(20, 100.0));
        let start = find_start(&records).expect("start found");
        assert!(start >= 2);
        assert!(records[start].power_w <= POWER_SPIKE_THRESHOLD_W);
    }

    #[test]
    fn detects_braking_end() {
        let mut records = descending_run(10, 100.0);
        records.push(record(5.0, 0.0, 92.0, 48.85, 2.35)); // sharp decel
        let end = find_end(&records, 0).expect("end found");
        assert_eq!(end, 10);
    }

    #[test]
    fn validates_sufficient_descent() {
        let records = descending_run(15, 100.0);
        let descent = CoastDescent {
            start_index: 0,
            end_index: 14,
        };
        assert!(validate(&records, &descent, 5.0, 0.20).is_ok());
    }

    #[test]
    fn rejects_insufficient_altitude_drop() {
        let records: Vec<Record> = (0..10).map(|_| record(25.0, 0.0, 100.0, 48.85, 2.35)).collect();
        let descent = CoastDescent {
            start_index: 0,
            end_index: 9,
        };
        assert_eq!(
            validate(&records, &descent, 5.0, 0.20),
            Err(ValidationFailure::AltitudeNeverDrops)
        );
    }

    #[test]
    fn rejects_too_short_window() {
        let records = descending_run(3, 100.0);
        let descent = CoastDescent {
            start_index: 0,
            end_index: 2,
        };
        assert_eq!(validate(&records, &descent, 1.0, 0.5), Err(ValidationFailure::TooShort));
    }
}
