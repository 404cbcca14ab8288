//! Whole-lap aggregation for the lap-efficiency ("circle") protocol.
//!
//! Unlike the constant-power detector this performs no windowing: every
//! record in the lap contributes to one aggregate.

use crate::energy::aero_corrected_residual;
use crate::geodesy::{coefficient_of_variation, mean};
use crate::ingest::Record;

/// Per-lap aggregate for the circle protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleLap {
    pub lap_index: u32,
    pub pressure: f64,
    pub avg_power: f64,
    pub avg_speed_kmh: f64,
    pub power_cv: f64,
    pub speed_cv: f64,
    pub min_power: f64,
    pub max_power: f64,
    pub vibration_rms: f64,
    pub duration_s: usize,
    pub distance_m: f64,
    pub sample_count: usize,
    pub efficiency: f64,
    /// Aero-corrected rolling-resistance residual, mean over samples with
    /// `v > 0.5 m/s` of `(P - 0.5 * CdA * rho * v^3) / v`.
    pub rolling_residual: f64,
    pub data_quality: f64,
    pub valid: bool,
}

/// Aggregate one full lap of records into a [`CircleLap`].
pub fn aggregate_lap(
    records: &[Record],
    pressure: f64,
    lap_index: u32,
    cda: f64,
    rho: f64,
) -> CircleLap {
    let powers: Vec<f64> = records.iter().map(|r| r.power_w).collect();
    let speeds_kmh: Vec<f64> = records.iter().map(|r| r.wheel_speed_kmh).collect();

    let avg_power = mean(&powers);
    let avg_speed_kmh = mean(&speeds_kmh);
    let power_cv = coefficient_of_variation(&powers);
    let speed_cv = coefficient_of_variation(&speeds_kmh);
    let min_power = powers.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_power = powers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let vibrations: Vec<f64> = records.iter().filter_map(|r| r.vibration_g).collect();
    let vibration_rms = if vibrations.is_empty() {
        0.0
    } else {
        (vibrations.iter().map(|v| v * v).sum::<f64>() / vibrations.len() as f64).sqrt()
    };

    // Distance assuming 1 s sample cadence: sum of per-sample speed in m/s.
    let distance_m: f64 = records.iter().map(|r| r.speed_ms()).sum();

    let efficiency = if avg_power > 0.0 {
        avg_speed_kmh / avg_power
    } else {
        0.0
    };

    let residuals: Vec<f64> = records
        .iter()
        .filter(|r| r.speed_ms() > 0.5)
        .map(|r| aero_corrected_residual(r.power_w, r.speed_ms(), cda, rho))
        .collect();
    let rolling_residual = mean(&residuals);

    let sample_count = records.len();
    let valid = sample_count >= 30 && avg_power >= 50.0 && power_cv <= 0.25;

    let n_factor = (sample_count as f64 / 60.0).clamp(0.5, 1.0);
    let data_quality = n_factor * (1.0 / (1.0 + 2.0 * power_cv)) * (1.0 / (1.0 + speed_cv));

    CircleLap {
        lap_index,
        pressure,
        avg_power,
        avg_speed_kmh,
        power_cv,
        speed_cv,
        min_power: if min_power.is_finite() { min_power } else { 0.0 },
        max_power: if max_power.is_finite() { max_power } else { 0.0 },
        vibration_rms,
        duration_s: sample_count,
        distance_m,
        sample_count,
        efficiency,
        rolling_residual,
        data_quality,
        valid,
    }
}

/// Non-fatal cross-lap warnings: duration drift and pacing spread versus the
/// first valid lap.
pub fn cross_lap_warnings(laps: &[CircleLap]) -> Vec<String> {
    let mut warnings = Vec::new();
    let Some(reference) = laps.iter().find(|l| l.valid) else {
        return warnings;
    };

    for lap in laps.iter().filter(|l| l.valid) {
        if reference.duration_s > 0 {
            let drift = (lap.duration_s as f64 - reference.duration_s as f64).abs()
                / reference.duration_s as f64;
            if drift > 0.10 {
                warnings.push(format!(
                    "lap {} duration differs from reference by {:.0}%",
                    lap.lap_index,
                    drift * 100.0
                ));
            }
        }
    }

    let valid_powers: Vec<f64> = laps.iter().filter(|l| l.valid).map(|l| l.avg_power).collect();
    let max = valid_powers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = valid_powers.iter().cloned().fold(f64::INFINITY, f64::min);
    if max.is_finite() && max > 0.0 && (max - min) / max > 0.10 {
        warnings.push(format!(
            "cross-lap power spread {:.0}% exceeds 10%, pacing varied",
            (max - min) / max * 100.0
        ));
    }

    warnings
}
