//! `Pipeline` is the single facade callers use: feed it an ingested session
//! and get back a protocol's complete analysis, without reaching into the
//! detection/alignment/regression stages directly.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::align::{fully_covered_intervals, largest_cluster, sample_at_distance, single_gate, ClusterCandidate, Interval};
use crate::config::{AnalysisConfig, BikeType};
use crate::coastdown::{extract, trim_to_gate};
use crate::error::{AlignError, CoreError};
use crate::geodesy::mean;
use crate::ingest::{IngestedSession, Record};
use crate::regression::{regress, RegressionPoint};
use crate::result::{AnalysisResult, Protocol, RecommendedPressures};
use crate::segments::{aggregate_lap, cross_lap_warnings, detect_segments, MatchedSegment};
use crate::signature::{RouteSignature, SignatureStore};

/// Average power and average speed for the samples of `records` whose
/// lap-local distance falls in `[start, end]`, falling back to the
/// boundary-interpolated speed at both ends when too few interior samples
/// exist to average directly.
fn matched_window_stats(records: &[Record], start: f64, end: f64) -> Option<(f64, f64)> {
    let entry = sample_at_distance(records, start)?;
    let exit = sample_at_distance(records, end)?;

    let window: Vec<&Record> = records
        .iter()
        .filter(|r| r.distance_m >= start && r.distance_m <= end)
        .collect();
    let powers: Vec<f64> = window.iter().map(|r| r.power_w).filter(|p| *p > 0.0).collect();
    if powers.is_empty() {
        return None;
    }
    let avg_power = mean(&powers);

    let speeds: Vec<f64> = window.iter().map(|r| r.wheel_speed_kmh).collect();
    let avg_speed_kmh = if speeds.is_empty() {
        (entry.speed_ms + exit.speed_ms) / 2.0 * 3.6
    } else {
        mean(&speeds)
    };

    Some((avg_power, avg_speed_kmh))
}

/// Runs one of the three analysis protocols against an ingested session,
/// holding the tunables every stage needs.
pub struct Pipeline<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    /// Cluster each lap's stable-power windows by start GPS zone and power
    /// agreement, intersect their distance coverage across laps, and emit
    /// one [`MatchedSegment`] (and one regression point per participating
    /// lap) per surviving shared interval.
    pub fn run_constant_power(
        &self,
        session: &IngestedSession,
        bike_type: BikeType,
    ) -> Result<AnalysisResult, CoreError> {
        let mut candidates: Vec<(u32, f64, crate::segments::ConstantPowerSegment, &[Record])> = Vec::new();
        for lap_index in session.lap_indices() {
            let records = session.records(lap_index);
            let Some(metadata) = session.metadata.get(&lap_index) else {
                continue;
            };
            if metadata.rear_pressure <= 0.0 {
                continue;
            }
            let segments = detect_segments(
                records,
                metadata.rear_pressure,
                lap_index,
                self.config.min_window,
                self.config.segment_cv_threshold,
            );
            for segment in segments {
                candidates.push((lap_index, metadata.rear_pressure, segment, records));
            }
        }

        if candidates.len() < 3 {
            return Err(AlignError::InsufficientRuns {
                stage: "constant_power_detect",
                required: 3,
                found: candidates.len(),
            }
            .into());
        }

        let cluster_candidates: Vec<ClusterCandidate> = candidates
            .iter()
            .map(|(lap_index, _, segment, _)| ClusterCandidate {
                lap_index: *lap_index,
                lat: segment.start_lat,
                lon: segment.start_lon,
                avg_power: Some(segment.avg_power),
            })
            .collect();
        let cluster = largest_cluster(
            &cluster_candidates,
            self.config.gps_zone_radius_m,
            Some(self.config.zone_power_tol_pct),
            3,
        )
        .ok_or(AlignError::InsufficientRuns {
            stage: "constant_power_cluster",
            required: 3,
            found: 0,
        })?;

        // One representative segment per lap: the first cluster member seen
        // for that lap.
        let mut representative: BTreeMap<u32, usize> = BTreeMap::new();
        for &idx in &cluster {
            representative.entry(candidates[idx].0).or_insert(idx);
        }
        if representative.len() < 3 {
            return Err(AlignError::InsufficientRuns {
                stage: "constant_power_cluster",
                required: 3,
                found: representative.len(),
            }
            .into());
        }

        let per_lap_intervals: Vec<(u32, Vec<Interval>)> = representative
            .iter()
            .map(|(&lap_index, &idx)| {
                let (_, _, segment, records) = &candidates[idx];
                let end_idx = segment.end_index.saturating_sub(1).min(records.len() - 1);
                (
                    lap_index,
                    vec![Interval {
                        start: records[segment.start_index].distance_m,
                        end: records[end_idx].distance_m,
                    }],
                )
            })
            .collect();
        let required_laps: Vec<u32> = representative.keys().copied().collect();
        let covered: Vec<Interval> = fully_covered_intervals(&per_lap_intervals, &required_laps)
            .into_iter()
            .filter(|interval| interval.end - interval.start >= self.config.min_segment_distance_m)
            .collect();

        if covered.is_empty() {
            return Err(AlignError::InsufficientRuns {
                stage: "constant_power_interval",
                required: 1,
                found: 0,
            }
            .into());
        }

        let mut matched_segments = Vec::new();
        for (cluster_id, interval) in covered.iter().enumerate() {
            let mut laps = BTreeMap::new();
            let mut points = Vec::new();
            for (&lap_index, &idx) in &representative {
                let (_, pressure, segment, records) = &candidates[idx];
                let Some((avg_power, avg_speed_kmh)) = matched_window_stats(records, interval.start, interval.end) else {
                    continue;
                };
                let efficiency = if avg_power > 0.0 { avg_speed_kmh / avg_power } else { 0.0 };
                points.push(RegressionPoint { x: *pressure, y: efficiency });
                laps.insert(lap_index, segment.clone());
            }
            if laps.len() < required_laps.len() {
                continue;
            }
            matched_segments.push(MatchedSegment {
                cluster_id,
                interval_start_m: interval.start,
                interval_end_m: interval.end,
                laps,
                points,
            });
        }

        if matched_segments.is_empty() {
            return Err(AlignError::InsufficientRuns {
                stage: "constant_power_interval",
                required: 1,
                found: 0,
            }
            .into());
        }

        let points: Vec<RegressionPoint> = matched_segments.iter().flat_map(|m| m.points.clone()).collect();
        let power_cvs: Vec<f64> = representative.values().map(|&idx| candidates[idx].2.power_cv).collect();
        let power_cv = if power_cvs.is_empty() { None } else { Some(mean(&power_cvs)) };

        let regression = regress(
            &points,
            false,
            power_cv,
            self.config.min_quadratic_points,
            self.config.power_cv_warn_threshold,
        );
        let recommended = RecommendedPressures::from_rear_optimum(regression.optimal_x, self.config, bike_type);

        Ok(AnalysisResult {
            protocol: Protocol::ConstantPower,
            points,
            regression,
            recommended,
            warnings: Vec::new(),
        })
    }

    /// Aggregate each lap as a whole (no windowing) and fit the quadratic
    /// across valid laps.
    pub fn run_circle(&self, session: &IngestedSession, bike_type: BikeType) -> Result<AnalysisResult, CoreError> {
        let mut laps = Vec::new();
        for lap_index in session.lap_indices() {
            let records = session.records(lap_index);
            let Some(metadata) = session.metadata.get(&lap_index) else {
                continue;
            };
            if metadata.rear_pressure <= 0.0 || records.is_empty() {
                continue;
            }
            laps.push(aggregate_lap(
                records,
                metadata.rear_pressure,
                lap_index,
                self.config.cda(bike_type),
                self.config.rho,
            ));
        }

        let valid: Vec<_> = laps.iter().filter(|l| l.valid).collect();
        if valid.len() < 2 {
            return Err(AlignError::InsufficientRuns {
                stage: "circle",
                required: 2,
                found: valid.len(),
            }
            .into());
        }

        let points: Vec<RegressionPoint> = valid.iter().map(|l| RegressionPoint { x: l.pressure, y: l.efficiency }).collect();
        let power_cv = Some(mean(&valid.iter().map(|l| l.power_cv).collect::<Vec<_>>()));
        let regression = regress(
            &points,
            false,
            power_cv,
            self.config.min_quadratic_points,
            self.config.power_cv_warn_threshold,
        );
        let recommended = RecommendedPressures::from_rear_optimum(regression.optimal_x, self.config, bike_type);

        Ok(AnalysisResult {
            protocol: Protocol::Circle,
            points,
            regression,
            recommended,
            warnings: cross_lap_warnings(&laps),
        })
    }

    /// Validate each lap's coast-down window, confirm a shared start point
    /// and shared gate across laps, then fit the quadratic against
    /// `-CRR` (regression maximizes, rolling resistance should be minimized).
    ///
    /// `signatures`, when given, both sanity-checks the trimmed gate's
    /// altitude drop against the site's historical envelope and updates
    /// that envelope with this session's samples.
    pub fn run_coast_down(
        &self,
        session: &IngestedSession,
        bike_type: BikeType,
        signatures: Option<&SignatureStore>,
    ) -> Result<AnalysisResult, CoreError> {
        let mut candidates = Vec::new();
        for lap_index in session.lap_indices() {
            let records = session.records(lap_index);
            let Some(metadata) = session.metadata.get(&lap_index) else {
                continue;
            };
            if metadata.rear_pressure <= 0.0 || records.len() < 4 {
                continue;
            }
            if let Some(descent) = extract(records, self.config.min_altitude_drop_m, self.config.max_altitude_error_rate) {
                candidates.push((lap_index, metadata, records, descent));
            }
        }

        if candidates.len() < 2 {
            return Err(AlignError::InsufficientRuns {
                stage: "coast_down_detect",
                required: 2,
                found: candidates.len(),
            }
            .into());
        }

        let cluster_candidates: Vec<ClusterCandidate> = candidates
            .iter()
            .map(|(lap_index, _, records, descent)| ClusterCandidate {
                lap_index: *lap_index,
                lat: records[descent.start_index].lat,
                lon: records[descent.start_index].lon,
                avg_power: None,
            })
            .collect();
        let cluster = largest_cluster(&cluster_candidates, self.config.start_gps_radius_m, None, 3).ok_or(
            AlignError::InsufficientRuns {
                stage: "coast_down_cluster",
                required: 3,
                found: 0,
            },
        )?;

        let clustered: Vec<_> = cluster.iter().map(|&i| &candidates[i]).collect();
        let starts: Vec<f64> = clustered
            .iter()
            .map(|(_, _, records, descent)| records[descent.start_index].distance_m)
            .collect();
        let ends: Vec<f64> = clustered
            .iter()
            .map(|(_, _, records, descent)| records[descent.end_index.min(records.len() - 1)].distance_m)
            .collect();
        let gate = single_gate(&starts, &ends).ok_or(AlignError::InsufficientRuns {
            stage: "coast_down_gate",
            required: 2,
            found: 0,
        })?;

        let mut points = Vec::new();
        let mut altitude_drops = Vec::new();
        let mut durations = Vec::new();
        let mut speeds = Vec::new();
        let mut centroid_lat = 0.0;
        let mut centroid_lon = 0.0;

        for (lap_index, metadata, records, descent) in &clustered {
            let Some(segment) = trim_to_gate(
                records,
                descent,
                gate.start,
                gate.end,
                *lap_index,
                metadata.front_pressure,
                metadata.rear_pressure,
            ) else {
                continue;
            };
            points.push(RegressionPoint {
                x: metadata.rear_pressure,
                y: -segment.crr,
            });
            altitude_drops.push(segment.altitude_drop_m);
            durations.push(segment.duration_s);
            speeds.push(segment.avg_speed_ms);
            centroid_lat += segment.start_lat;
            centroid_lon += segment.start_lon;
        }

        if points.len() < 2 {
            return Err(AlignError::InsufficientRuns {
                stage: "coast_down_trim",
                required: 2,
                found: points.len(),
            }
            .into());
        }
        centroid_lat /= points.len() as f64;
        centroid_lon /= points.len() as f64;

        let mut warnings = Vec::new();
        if let Some(store) = signatures {
            match store.load_signature_nearby(centroid_lat, centroid_lon, self.config.signature_match_radius_m) {
                Ok(Some(existing)) => {
                    let envelope = existing.envelope(self.config.k_sigma);
                    let mean_drop = mean(&altitude_drops);
                    if mean_drop < envelope.altitude_drop.0 || mean_drop > envelope.altitude_drop.1 {
                        warnings.push(format!(
                            "altitude drop {mean_drop:.1}m outside this site's historical range [{:.1}, {:.1}]",
                            envelope.altitude_drop.0, envelope.altitude_drop.1
                        ));
                    }
                }
                Ok(None) => {}
                Err(e) => warnings.push(format!("route signature lookup failed: {e}")),
            }

            if points.len() >= 3 {
                let signature = RouteSignature::learn(centroid_lat, centroid_lon, Utc::now(), &altitude_drops, &durations, &speeds);
                if let Err(e) = store.store_signature(&signature, self.config.signature_match_radius_m) {
                    warnings.push(format!("route signature store failed: {e}"));
                }
            }
            // Learning needs 3+ trimmed runs; a cluster of exactly 3 can still
            // drop to 2 here if one lap's window doesn't cover the gate.
        }

        let regression = regress(
            &points,
            false,
            None,
            self.config.min_quadratic_points,
            self.config.power_cv_warn_threshold,
        );
        let recommended = RecommendedPressures::from_rear_optimum(regression.optimal_x, self.config, bike_type);

        Ok(AnalysisResult {
            protocol: Protocol::CoastDown,
            points,
            regression,
            recommended,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest_str;

    fn sample_line(lap: u32, t: u32, power: f64, speed_kmh: f64, lat: f64, lon: f64) -> String {
        format!(
            r#"{{"lapIndex": {lap}, "ts": "2024-01-01T00:00:{t:02}Z", "power": {power}, "speed_kmh": {speed_kmh}, "cadence": 85, "distance": {dist}, "altitude": 100.0, "lat": {lat}, "lon": {lon}}}"#,
            dist = t as f64 * (speed_kmh / 3.6)
        )
    }

    fn metadata_line(lap: u32, front: f64, rear: f64) -> String {
        format!(r#"{{"lapIndex": {lap}, "frontPressure": {front}, "rearPressure": {rear}}}"#)
    }

    fn build_constant_power_session() -> IngestedSession {
        let mut content = String::new();
        let pressures = [(0u32, 60.0, 62.0, 195.0), (1, 65.0, 67.0, 205.0), (2, 70.0, 72.0, 200.0)];
        for (lap, front, rear, power) in pressures {
            content.push_str(&metadata_line(lap, front, rear));
            content.push('\n');
            for t in 0..20 {
                content.push_str(&sample_line(lap, t, power, 30.0, 48.85 + lap as f64 * 0.0001, 2.35));
                content.push('\n');
            }
        }
        ingest_str(&content)
    }

    #[test]
    fn constant_power_pipeline_produces_a_result() {
        let session = build_constant_power_session();
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config);
        let result = pipeline.run_constant_power(&session, BikeType::Road).unwrap();
        assert_eq!(result.points.len(), 3);
        assert!(result.recommended.front <= result.recommended.rear);
    }

    #[test]
    fn constant_power_requires_at_least_two_usable_laps() {
        let session = ingest_str(&format!(
            "{}\n{}\n",
            metadata_line(0, 65.0, 68.0),
            sample_line(0, 0, 200.0, 30.0, 48.85, 2.35)
        ));
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config);
        assert!(pipeline.run_constant_power(&session, BikeType::Road).is_err());
    }

    #[test]
    fn circle_pipeline_requires_enough_stable_samples() {
        let mut content = String::new();
        for (lap, rear) in [(0u32, 60.0), (1, 70.0)] {
            content.push_str(&metadata_line(lap, 62.0, rear));
            content.push('\n');
            for t in 0..5 {
                content.push_str(&sample_line(lap, t, 200.0, 30.0, 48.85, 2.35));
                content.push('\n');
            }
        }
        let session = ingest_str(&content);
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config);
        assert!(pipeline.run_circle(&session, BikeType::Road).is_err());
    }
}
