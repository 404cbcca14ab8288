//! Line-delimited JSON parser for ride-data ingest files.
//!
//! Each non-blank line is read as one JSON object via [`serde_json::Value`]
//! rather than a derived struct: the source schema tolerates unknown fields
//! and two spellings of several keys, a shape that a flat `Deserialize`
//! struct would make awkward to extend. Reading named fields directly off
//! the value keeps "unknown fields ignored" true by construction.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{IngestedSession, LapMetadata, Record, VibrationSummary};
use crate::error::IngestError;

/// Parse a ride-data ingest file into a session.
pub fn ingest(path: &Path) -> Result<IngestedSession, IngestError> {
    if !path.exists() {
        return Err(IngestError::NotFound(path.display().to_string()));
    }
    let contents = std::fs::read_to_string(path)?;
    let session = ingest_str(&contents);

    if session.diagnostics.sample_lines + session.diagnostics.metadata_lines == 0 {
        return Err(IngestError::Empty);
    }

    Ok(session)
}

/// Parse ingest content already read into memory. Never fails: malformed and
/// blank lines are skipped and counted rather than treated as fatal.
pub fn ingest_str(contents: &str) -> IngestedSession {
    let mut session = IngestedSession::default();

    for line in contents.lines() {
        session.diagnostics.total_lines += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            session.diagnostics.blank_lines += 1;
            continue;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                session.diagnostics.malformed_lines += 1;
                continue;
            }
        };

        let Some(object) = value.as_object() else {
            session.diagnostics.malformed_lines += 1;
            continue;
        };

        let Some(lap_index) = object.get("lapIndex").and_then(Value::as_u64) else {
            session.diagnostics.malformed_lines += 1;
            continue;
        };
        let lap_index = lap_index as u32;

        let has_sample_fields = object.contains_key("ts")
            || object.contains_key("timestamp")
            || object.contains_key("power");
        let has_metadata_fields = object.contains_key("frontPressure");

        if !has_sample_fields && !has_metadata_fields {
            session.diagnostics.malformed_lines += 1;
            continue;
        }

        if has_sample_fields {
            let record = parse_record(object);
            session.laps.entry(lap_index).or_default().push(record);
            session.diagnostics.sample_lines += 1;
        }

        if has_metadata_fields {
            let metadata = parse_metadata(lap_index, object);
            session.metadata.insert(lap_index, metadata);
            session.diagnostics.metadata_lines += 1;
        }

        if has_sample_fields && has_metadata_fields {
            session.diagnostics.combined_lines += 1;
        }
    }

    // Complete the maps: every lap index present in either source gets an
    // entry in both.
    let all_laps: Vec<u32> = session
        .laps
        .keys()
        .chain(session.metadata.keys())
        .copied()
        .collect();
    for lap_index in all_laps {
        session.laps.entry(lap_index).or_default();
        session
            .metadata
            .entry(lap_index)
            .or_insert_with(|| LapMetadata::missing(lap_index));
    }

    session
}

fn first_present_f64(object: &serde_json::Map<String, Value>, keys: &[&str]) -> f64 {
    for key in keys {
        if let Some(v) = object.get(*key).and_then(Value::as_f64) {
            return v;
        }
    }
    0.0
}

fn parse_timestamp(object: &serde_json::Map<String, Value>) -> DateTime<Utc> {
    for key in ["ts", "timestamp"] {
        if let Some(s) = object.get(key).and_then(Value::as_str) {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return parsed.with_timezone(&Utc);
            }
        }
    }
    DateTime::<Utc>::UNIX_EPOCH
}

fn parse_record(object: &serde_json::Map<String, Value>) -> Record {
    Record {
        timestamp: parse_timestamp(object),
        wheel_speed_kmh: first_present_f64(object, &["speed_kmh", "speed"]),
        cadence_rpm: object
            .get("cadence")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u16,
        power_w: object.get("power").and_then(Value::as_f64).unwrap_or(0.0),
        distance_m: object
            .get("distance")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        altitude_m: object
            .get("altitude")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        lat: object.get("lat").and_then(Value::as_f64).unwrap_or(0.0),
        lon: object.get("lon").and_then(Value::as_f64).unwrap_or(0.0),
        vibration_g: object
            .get("vibration")
            .or_else(|| object.get("vibrationRms"))
            .and_then(Value::as_f64),
    }
}

fn parse_metadata(lap_index: u32, object: &serde_json::Map<String, Value>) -> LapMetadata {
    let vibration = object
        .get("vibrationAvg")
        .and_then(Value::as_f64)
        .map(|avg| VibrationSummary {
            avg,
            min: object.get("vibrationMin").and_then(Value::as_f64).unwrap_or(avg),
            max: object.get("vibrationMax").and_then(Value::as_f64).unwrap_or(avg),
            std_dev: object
                .get("vibrationStdDev")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            sample_count: object
                .get("vibrationSampleCount")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
        });

    LapMetadata {
        lap_index,
        front_pressure: object
            .get("frontPressure")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        rear_pressure: object
            .get("rearPressure")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        start_time: object
            .get("ts")
            .or_else(|| object.get("timestamp"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        vibration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line(lap: u32, ts: &str, power: f64) -> String {
        format!(
            r#"{{"lapIndex": {lap}, "ts": "{ts}", "power": {power}, "speed_kmh": 30.0, "cadence": 85, "distance": 10.0, "altitude": 100.0, "lat": 48.85, "lon": 2.35}}"#
        )
    }

    #[test]
    fn parses_sample_and_metadata_lines() {
        let content = format!(
            "{}\n{{\"lapIndex\": 0, \"frontPressure\": 65.0, \"rearPressure\": 68.0}}\n",
            sample_line(0, "2024-01-01T00:00:00Z", 200.0)
        );
        let session = ingest_str(&content);
        assert_eq!(session.diagnostics.sample_lines, 1);
        assert_eq!(session.diagnostics.metadata_lines, 1);
        assert_eq!(session.laps[&0].len(), 1);
        assert_eq!(session.metadata[&0].front_pressure, 65.0);
    }

    #[test]
    fn skips_blank_and_malformed_lines_without_failing() {
        let content = "\n{not json}\n{\"noLapIndex\": true}\n";
        let session = ingest_str(content);
        assert_eq!(session.diagnostics.blank_lines, 1);
        assert_eq!(session.diagnostics.malformed_lines, 2);
        assert!(session.laps.is_empty());
    }

    #[test]
    fn missing_metadata_lap_gets_zeroed_entry() {
        let content = sample_line(3, "2024-01-01T00:00:00Z", 150.0);
        let session = ingest_str(&content);
        assert!(session.metadata.contains_key(&3));
        assert_eq!(session.metadata[&3].front_pressure, 0.0);
    }

    #[test]
    fn timestamp_key_prefers_ts_over_timestamp() {
        let line = r#"{"lapIndex": 0, "ts": "2024-01-01T00:00:01Z", "timestamp": "2024-01-01T00:00:99Z", "power": 100}"#;
        let session = ingest_str(line);
        let record = &session.laps[&0][0];
        assert_eq!(record.timestamp.to_rfc3339(), "2024-01-01T00:00:01+00:00");
    }

    #[test]
    fn speed_key_first_present_wins() {
        let line = r#"{"lapIndex": 0, "ts": "2024-01-01T00:00:00Z", "speed_kmh": 25.0, "speed": 99.0}"#;
        let session = ingest_str(line);
        assert_eq!(session.laps[&0][0].wheel_speed_kmh, 25.0);
    }

    #[test]
    fn ingest_idempotence_on_repeated_parse() {
        let content = format!(
            "{}\n{}\n",
            sample_line(0, "2024-01-01T00:00:00Z", 150.0),
            sample_line(0, "2024-01-01T00:00:01Z", 160.0)
        );
        let first = ingest_str(&content);
        let second = ingest_str(&content);
        assert_eq!(first.laps, second.laps);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn not_found_reports_path() {
        let err = ingest(Path::new("/nonexistent/path/ride.jsonl")).unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }
}
