//! Trims a validated [`CoastDescent`] window to a shared entry/exit gate and
//! derives the coast-down energy-balance output for that run.

use crate::energy::coast_down_crr;
use crate::geodesy::lerp;
use crate::ingest::Record;

use super::extractor::CoastDescent;

/// A coast-down window trimmed to the cross-lap shared gate, with derived
/// rolling-resistance and efficiency figures.
#[derive(Debug, Clone, PartialEq)]
pub struct DescentSegment {
    pub lap_index: u32,
    pub front_pressure: f64,
    pub rear_pressure: f64,
    pub altitude_drop_m: f64,
    pub duration_s: f64,
    pub avg_speed_ms: f64,
    pub peak_speed_ms: f64,
    pub gate_length_m: f64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub end_lat: f64,
    pub end_lon: f64,
    pub crr: f64,
    pub efficiency: f64,
    pub sample_count: usize,
}

/// Sample a scalar field by distance using linear interpolation at the
/// bracketing samples for `target_distance`.
fn interpolate_at_distance(
    distances: &[f64],
    values: &[f64],
    target_distance: f64,
) -> (usize, f64, f64) {
    let mut idx = 0;
    while idx + 1 < distances.len() && distances[idx + 1] < target_distance {
        idx += 1;
    }
    if idx + 1 >= distances.len() {
        let last = distances.len() - 1;
        return (last, 0.0, values[last]);
    }
    let f = if distances[idx + 1] == distances[idx] {
        0.0
    } else {
        (target_distance - distances[idx]) / (distances[idx + 1] - distances[idx])
    };
    let value = lerp(
        distances[idx],
        values[idx],
        distances[idx + 1],
        values[idx + 1],
        target_distance,
    );
    (idx, f, value)
}

/// Trim one run's descent window to `[entry_distance, exit_distance]` on its
/// lap-local distance axis (already confirmed comparable via start-point
/// clustering) and compute the descent's rolling-resistance figures.
pub fn trim_to_gate(
    records: &[Record],
    descent: &CoastDescent,
    entry_distance: f64,
    exit_distance: f64,
    lap_index: u32,
    front_pressure: f64,
    rear_pressure: f64,
) -> Option<DescentSegment> {
    let window = &records[descent.start_index..=descent.end_index.min(records.len() - 1)];
    if window.len() < 2 {
        return None;
    }

    let distances: Vec<f64> = window.iter().map(|r| r.distance_m).collect();
    let altitudes: Vec<f64> = window.iter().map(|r| r.altitude_m).collect();
    let speeds: Vec<f64> = window.iter().map(Record::speed_ms).collect();
    let lats: Vec<f64> = window.iter().map(|r| r.lat).collect();
    let lons: Vec<f64> = window.iter().map(|r| r.lon).collect();

    let (entry_idx, entry_f, entry_altitude) = interpolate_at_distance(&distances, &altitudes, entry_distance);
    let (_, _, entry_speed) = interpolate_at_distance(&distances, &speeds, entry_distance);
    let (_, _, entry_lat) = interpolate_at_distance(&distances, &lats, entry_distance);
    let (_, _, entry_lon) = interpolate_at_distance(&distances, &lons, entry_distance);

    let (exit_idx, exit_f, exit_altitude) = interpolate_at_distance(&distances, &altitudes, exit_distance);
    let (_, _, exit_speed) = interpolate_at_distance(&distances, &speeds, exit_distance);
    let (_, _, exit_lat) = interpolate_at_distance(&distances, &lats, exit_distance);
    let (_, _, exit_lon) = interpolate_at_distance(&distances, &lons, exit_distance);

    let gate_length_m = exit_distance - entry_distance;
    if gate_length_m <= 0.0 {
        return None;
    }

    let duration_s = (exit_idx as f64 + exit_f) - (entry_idx as f64 + entry_f);
    let altitude_drop_m = entry_altitude - exit_altitude;

    let trimmed_speeds = &speeds[entry_idx..=exit_idx.max(entry_idx)];
    let avg_speed_ms = if trimmed_speeds.is_empty() {
        (entry_speed + exit_speed) / 2.0
    } else {
        crate::geodesy::mean(trimmed_speeds)
    };
    let peak_speed_ms = trimmed_speeds
        .iter()
        .cloned()
        .fold(entry_speed.max(exit_speed), f64::max);

    let crr = coast_down_crr(altitude_drop_m, gate_length_m, entry_speed, exit_speed);
    let efficiency = if peak_speed_ms > 0.0 {
        gate_length_m / peak_speed_ms
    } else {
        0.0
    };

    Some(DescentSegment {
        lap_index,
        front_pressure,
        rear_pressure,
        altitude_drop_m,
        duration_s,
        avg_speed_ms,
        peak_speed_ms,
        gate_length_m,
        start_lat: entry_lat,
        start_lon: entry_lon,
        end_lat: exit_lat,
        end_lon: exit_lon,
        crr,
        efficiency,
        sample_count: exit_idx.saturating_sub(entry_idx) + 1,
    })
}
