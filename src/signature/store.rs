//! Persistent route-signature store, backed by SQLite. A signature is a
//! statistical fingerprint of a previously-validated coast-down cluster at a
//! GPS location, reused to sanity-check and bootstrap future analyses.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::SignatureError;
use crate::geodesy::haversine_distance;

/// A learned route fingerprint: mean/stddev over altitude drop, duration,
/// and average speed for a validated coast-down cluster, keyed by centroid
/// GPS location.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSignature {
    pub center_lat: f64,
    pub center_lon: f64,
    pub learned_at: DateTime<Utc>,
    pub sample_count: u32,
    pub mean_altitude_drop: f64,
    pub std_dev_altitude_drop: f64,
    pub mean_duration: f64,
    pub std_dev_duration: f64,
    pub mean_speed: f64,
    pub std_dev_speed: f64,
}

impl RouteSignature {
    /// Build a signature from a validated coast-down cluster's per-run
    /// altitude drop, duration, and average-speed samples, plus the
    /// cluster's centroid start location.
    pub fn learn(
        center_lat: f64,
        center_lon: f64,
        learned_at: DateTime<Utc>,
        altitude_drops: &[f64],
        durations: &[f64],
        speeds: &[f64],
    ) -> Self {
        Self {
            center_lat,
            center_lon,
            learned_at,
            sample_count: altitude_drops.len() as u32,
            mean_altitude_drop: crate::geodesy::mean(altitude_drops),
            std_dev_altitude_drop: crate::geodesy::stddev(altitude_drops),
            mean_duration: crate::geodesy::mean(durations),
            std_dev_duration: crate::geodesy::stddev(durations),
            mean_speed: crate::geodesy::mean(speeds),
            std_dev_speed: crate::geodesy::stddev(speeds),
        }
    }

    /// The min/max envelope at `mean +/- k*sigma` for each tracked quantity.
    pub fn envelope(&self, k_sigma: f64) -> SignatureEnvelope {
        SignatureEnvelope {
            altitude_drop: (
                self.mean_altitude_drop - k_sigma * self.std_dev_altitude_drop,
                self.mean_altitude_drop + k_sigma * self.std_dev_altitude_drop,
            ),
            duration: (
                self.mean_duration - k_sigma * self.std_dev_duration,
                self.mean_duration + k_sigma * self.std_dev_duration,
            ),
            speed: (
                self.mean_speed - k_sigma * self.std_dev_speed,
                self.mean_speed + k_sigma * self.std_dev_speed,
            ),
        }
    }
}

/// Derived min/max bounds for each tracked quantity at `mean +/- k*sigma`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignatureEnvelope {
    pub altitude_drop: (f64, f64),
    pub duration: (f64, f64),
    pub speed: (f64, f64),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS route_signatures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    center_lat REAL NOT NULL,
    center_lon REAL NOT NULL,
    learned_at TEXT NOT NULL,
    sample_count INTEGER NOT NULL,
    mean_altitude_drop REAL NOT NULL,
    std_dev_altitude_drop REAL NOT NULL,
    mean_duration REAL NOT NULL,
    std_dev_duration REAL NOT NULL,
    mean_speed REAL NOT NULL,
    std_dev_speed REAL NOT NULL
);
";

/// Owns the connection to the signature database. One key/value store
/// contract (§6's `route_signatures_v2`) is realized as one table rather
/// than a single serialized blob, since SQLite has no native haversine and
/// radius matching is cheaper done in Rust over rows than by deserializing
/// a whole JSON array on every query.
pub struct SignatureStore {
    conn: Connection,
}

impl SignatureStore {
    pub fn open_in_memory() -> Result<Self, SignatureError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open(path: &std::path::Path) -> Result<Self, SignatureError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SignatureError::Parse(format!("could not create store directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn all_signatures(&self) -> Result<Vec<(i64, RouteSignature)>, SignatureError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, center_lat, center_lon, learned_at, sample_count, mean_altitude_drop,
                    std_dev_altitude_drop, mean_duration, std_dev_duration, mean_speed, std_dev_speed
             FROM route_signatures",
        )?;
        let results = stmt
            .query_map([], |row| {
                let id: i64 = row.get(0)?;
                let learned_at_str: String = row.get(3)?;
                Ok((id, learned_at_str, row.get::<_, f64>(1)?, row.get::<_, f64>(2)?,
                    row.get::<_, i64>(4)?, row.get::<_, f64>(5)?, row.get::<_, f64>(6)?,
                    row.get::<_, f64>(7)?, row.get::<_, f64>(8)?, row.get::<_, f64>(9)?,
                    row.get::<_, f64>(10)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut signatures = Vec::new();
        for (id, learned_at_str, lat, lon, sample_count, mean_alt, std_alt, mean_dur, std_dur, mean_speed, std_speed) in results {
            let learned_at = DateTime::parse_from_rfc3339(&learned_at_str)
                .map_err(|e| SignatureError::Parse(e.to_string()))?
                .with_timezone(&Utc);
            signatures.push((
                id,
                RouteSignature {
                    center_lat: lat,
                    center_lon: lon,
                    learned_at,
                    sample_count: sample_count as u32,
                    mean_altitude_drop: mean_alt,
                    std_dev_altitude_drop: std_alt,
                    mean_duration: mean_dur,
                    std_dev_duration: std_dur,
                    mean_speed,
                    std_dev_speed: std_speed,
                },
            ));
        }
        Ok(signatures)
    }

    /// Return the first stored signature within `radius_m` of `(lat, lon)`,
    /// if any.
    pub fn load_signature_nearby(&self, lat: f64, lon: f64, radius_m: f64) -> Result<Option<RouteSignature>, SignatureError> {
        for (_, signature) in self.all_signatures()? {
            if haversine_distance(lat, lon, signature.center_lat, signature.center_lon) <= radius_m {
                return Ok(Some(signature));
            }
        }
        Ok(None)
    }

    /// Insert `signature`, replacing any existing entry within `radius_m` of
    /// its center rather than adding a second.
    pub fn store_signature(&self, signature: &RouteSignature, radius_m: f64) -> Result<(), SignatureError> {
        let existing = self
            .all_signatures()?
            .into_iter()
            .find(|(_, s)| haversine_distance(signature.center_lat, signature.center_lon, s.center_lat, s.center_lon) <= radius_m);

        if let Some((id, _)) = existing {
            self.conn.execute("DELETE FROM route_signatures WHERE id = ?1", params![id])?;
        }

        self.conn.execute(
            "INSERT INTO route_signatures
             (center_lat, center_lon, learned_at, sample_count, mean_altitude_drop,
              std_dev_altitude_drop, mean_duration, std_dev_duration, mean_speed, std_dev_speed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                signature.center_lat,
                signature.center_lon,
                signature.learned_at.to_rfc3339(),
                signature.sample_count,
                signature.mean_altitude_drop,
                signature.std_dev_altitude_drop,
                signature.mean_duration,
                signature.std_dev_duration,
                signature.mean_speed,
                signature.std_dev_speed,
            ],
        )?;

        Ok(())
    }

    /// Total number of stored signatures, for diagnostics and tests.
    pub fn count(&self) -> Result<usize, SignatureError> {
        Ok(self.all_signatures()?.len())
    }
}
