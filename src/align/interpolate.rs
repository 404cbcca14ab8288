//! Sampling a record stream at an arbitrary lap-local distance, by linear
//! interpolation between the bracketing samples.

use crate::geodesy::lerp;
use crate::ingest::Record;

/// A record's scalar fields sampled at a specific (possibly fractional)
/// distance position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledPoint {
    pub altitude_m: f64,
    pub speed_ms: f64,
    pub lat: f64,
    pub lon: f64,
}

/// Sample `records` at `target_distance` on the lap-local distance axis.
/// `records` must be sorted by non-decreasing `distance_m`.
///
/// When `target_distance` falls before the first or after the last sample,
/// returns the nearest endpoint's values (no extrapolation).
pub fn sample_at_distance(records: &[Record], target_distance: f64) -> Option<SampledPoint> {
    if records.is_empty() {
        return None;
    }
    if target_distance <= records[0].distance_m {
        return Some(SampledPoint {
            altitude_m: records[0].altitude_m,
            speed_ms: records[0].speed_ms(),
            lat: records[0].lat,
            lon: records[0].lon,
        });
    }
    let last = records.len() - 1;
    if target_distance >= records[last].distance_m {
        return Some(SampledPoint {
            altitude_m: records[last].altitude_m,
            speed_ms: records[last].speed_ms(),
            lat: records[last].lat,
            lon: records[last].lon,
        });
    }

    let mut i = 0;
    while i + 1 < records.len() && records[i + 1].distance_m < target_distance {
        i += 1;
    }
    let a = &records[i];
    let b = &records[i + 1];

    Some(SampledPoint {
        altitude_m: lerp(a.distance_m, a.altitude_m, b.distance_m, b.altitude_m, target_distance),
        speed_ms: lerp(a.distance_m, a.speed_ms(), b.distance_m, b.speed_ms(), target_distance),
        lat: lerp(a.distance_m, a.lat, b.distance_m, b.lat, target_distance),
        lon: lerp(a.distance_m, a.lon, b.distance_m, b.lon, target_distance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(distance: f64, altitude: f64, speed_kmh: f64) -> Record {
        Record {
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            wheel_speed_kmh: speed_kmh,
            cadence_rpm: 0,
            power_w: 0.0,
            distance_m: distance,
            altitude_m: altitude,
            lat: 48.85,
            lon: 2.35,
            vibration_g: None,
        }
    }

    #[test]
    fn sampling_at_existing_distance_returns_exact_value() {
        let records = vec![record(0.0, 100.0, 20.0), record(10.0, 90.0, 25.0)];
        let at_start = sample_at_distance(&records, 0.0).unwrap();
        assert_eq!(at_start.altitude_m, 100.0);
        let at_end = sample_at_distance(&records, 10.0).unwrap();
        assert_eq!(at_end.altitude_m, 90.0);
    }

    #[test]
    fn sampling_between_distances_interpolates() {
        let records = vec![record(0.0, 100.0, 0.0), record(10.0, 90.0, 0.0)];
        let mid = sample_at_distance(&records, 5.0).unwrap();
        assert_eq!(mid.altitude_m, 95.0);
    }
}
