//! Tunable configuration for the analysis pipeline, loaded from/saved to a
//! TOML file in the platform config directory.

use std::collections::HashMap;
use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bike category, used to select a default drag area and a front/rear
/// pressure distribution ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BikeType {
    Road,
    TimeTrial,
    Gravel,
    Mountain,
}

impl Default for BikeType {
    fn default() -> Self {
        BikeType::Road
    }
}

impl BikeType {
    /// Stable string key used to index the per-bike-type config maps (TOML
    /// map keys must be strings, unlike the JSON the rest of the app uses).
    pub fn key(self) -> &'static str {
        match self {
            BikeType::Road => "road",
            BikeType::TimeTrial => "time_trial",
            BikeType::Gravel => "gravel",
            BikeType::Mountain => "mountain",
        }
    }
}

/// Display unit for pressures. Purely presentational: the regression itself
/// is unit-agnostic as long as inputs are consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureUnit {
    Psi,
    Bar,
}

impl Default for PressureUnit {
    fn default() -> Self {
        PressureUnit::Psi
    }
}

/// Every tunable named by the analysis design, collected into one
/// serializable structure so the caller owns configuration explicitly
/// instead of relying on module-level defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Drag area (m^2) per bike type, keyed by [`BikeType::key`].
    pub cda_by_bike_type: HashMap<String, f64>,
    /// Air density, kg/m^3.
    pub rho: f64,
    /// Front/rear pressure distribution ratio per bike type, keyed by
    /// [`BikeType::key`].
    pub silca_ratio_by_bike_type: HashMap<String, f64>,
    /// Power-CV threshold above which confidence is demoted one step.
    pub power_cv_warn_threshold: f64,
    /// Minimum number of points for a non-degenerate quadratic fit.
    pub min_quadratic_points: usize,
    /// Start-point clustering radius for coast-down runs, meters.
    pub start_gps_radius_m: f64,
    /// Start-point clustering radius for constant-power zone matching, meters.
    pub gps_zone_radius_m: f64,
    /// Max relative average-power disagreement allowed within a
    /// constant-power zone cluster.
    pub zone_power_tol_pct: f64,
    /// Minimum surviving interval length for a constant-power MatchedSegment, meters.
    pub min_segment_distance_m: f64,
    /// Minimum altitude drop for a valid coast-down window, meters.
    pub min_altitude_drop_m: f64,
    /// Maximum fraction of non-decreasing altitude samples tolerated in a
    /// coast-down window.
    pub max_altitude_error_rate: f64,
    /// CV threshold for constant-power segment growth.
    pub segment_cv_threshold: f64,
    /// Minimum seed window length for the constant-power detector.
    pub min_window: usize,
    /// Radius within which a new route signature replaces an existing one, meters.
    pub signature_match_radius_m: f64,
    /// Multiplier applied to standard deviation when deriving a route
    /// signature's min/max envelope.
    pub k_sigma: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let mut cda_by_bike_type = HashMap::new();
        cda_by_bike_type.insert(BikeType::Road.key().to_string(), 0.320);
        cda_by_bike_type.insert(BikeType::TimeTrial.key().to_string(), 0.240);
        cda_by_bike_type.insert(BikeType::Gravel.key().to_string(), 0.380);
        cda_by_bike_type.insert(BikeType::Mountain.key().to_string(), 0.500);

        let mut silca_ratio_by_bike_type = HashMap::new();
        silca_ratio_by_bike_type.insert(BikeType::Road.key().to_string(), 0.923);
        silca_ratio_by_bike_type.insert(BikeType::TimeTrial.key().to_string(), 1.0);
        silca_ratio_by_bike_type.insert(BikeType::Gravel.key().to_string(), 0.887);
        silca_ratio_by_bike_type.insert(BikeType::Mountain.key().to_string(), 0.869);

        Self {
            cda_by_bike_type,
            rho: 1.204,
            silca_ratio_by_bike_type,
            power_cv_warn_threshold: 0.25,
            min_quadratic_points: 3,
            start_gps_radius_m: 50.0,
            gps_zone_radius_m: 50.0,
            zone_power_tol_pct: 0.20,
            min_segment_distance_m: 20.0,
            min_altitude_drop_m: 5.0,
            max_altitude_error_rate: 0.20,
            segment_cv_threshold: 0.10,
            min_window: 10,
            signature_match_radius_m: 1000.0,
            k_sigma: 1.5,
        }
    }
}

impl AnalysisConfig {
    /// Drag area for `bike_type`, falling back to the road default if the
    /// caller's config map omits an entry.
    pub fn cda(&self, bike_type: BikeType) -> f64 {
        self.cda_by_bike_type
            .get(bike_type.key())
            .copied()
            .unwrap_or(0.320)
    }

    /// Front/rear ratio for `bike_type`, falling back to the road default.
    pub fn silca_ratio(&self, bike_type: BikeType) -> f64 {
        self.silca_ratio_by_bike_type
            .get(bike_type.key())
            .copied()
            .unwrap_or(0.923)
    }
}

/// Config file load/save failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Platform-appropriate path for the analysis config file.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("com", "rustride", "TireTune").ok_or(ConfigError::NoConfigDir)?;
    Ok(dirs.config_dir().join("analysis_config.toml"))
}

/// Load the config from disk, falling back to defaults if the file does not
/// exist yet.
pub fn load_config() -> Result<AnalysisConfig, ConfigError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(AnalysisConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Save the config to disk, creating the parent directory if needed.
pub fn save_config(config: &AnalysisConfig) -> Result<(), ConfigError> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_literals() {
        let cfg = AnalysisConfig::default();
        assert_eq!(cfg.rho, 1.204);
        assert_eq!(cfg.power_cv_warn_threshold, 0.25);
        assert_eq!(cfg.min_quadratic_points, 3);
        assert_eq!(cfg.signature_match_radius_m, 1000.0);
        assert_eq!(cfg.k_sigma, 1.5);
        assert_eq!(cfg.cda(BikeType::Road), 0.320);
        assert_eq!(cfg.silca_ratio(BikeType::Road), 0.923);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = AnalysisConfig::default();
        let serialized = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: AnalysisConfig = toml::from_str(&serialized).expect("parse");
        assert_eq!(parsed.rho, cfg.rho);
        assert_eq!(parsed.cda(BikeType::Gravel), cfg.cda(BikeType::Gravel));
    }
}
