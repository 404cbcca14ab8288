//! Greedy start-point clustering: confirms a group of runs shared a physical
//! starting location before any cross-lap distance comparison is trusted.

use crate::geodesy::haversine_distance;

/// Minimal view of a candidate run needed for clustering: its lap, start
/// GPS, and (for constant-power zone matching) its average power.
#[derive(Debug, Clone, Copy)]
pub struct ClusterCandidate {
    pub lap_index: u32,
    pub lat: f64,
    pub lon: f64,
    pub avg_power: Option<f64>,
}

/// Greedy O(n^2) clustering: for each unused candidate, open a cluster and
/// pull in every unused candidate within `radius_m`, additionally gated by
/// power agreement when `power_tol_pct` is set. Returns the single largest
/// cluster with at least `min_cluster_size` members, if any.
pub fn largest_cluster(
    candidates: &[ClusterCandidate],
    radius_m: f64,
    power_tol_pct: Option<f64>,
    min_cluster_size: usize,
) -> Option<Vec<usize>> {
    let mut used = vec![false; candidates.len()];
    let mut best: Option<Vec<usize>> = None;

    for seed in 0..candidates.len() {
        if used[seed] {
            continue;
        }
        let mut cluster = vec![seed];
        let mut cluster_used = vec![false; candidates.len()];
        cluster_used[seed] = true;

        for other in 0..candidates.len() {
            if other == seed || used[other] || cluster_used[other] {
                continue;
            }
            let distance = haversine_distance(
                candidates[seed].lat,
                candidates[seed].lon,
                candidates[other].lat,
                candidates[other].lon,
            );
            if distance > radius_m {
                continue;
            }
            if let Some(tol) = power_tol_pct {
                if let (Some(p_seed), Some(p_other)) =
                    (candidates[seed].avg_power, candidates[other].avg_power)
                {
                    let larger = p_seed.max(p_other);
                    if larger > 0.0 && (p_seed - p_other).abs() / larger > tol {
                        continue;
                    }
                }
            }
            cluster.push(other);
            cluster_used[other] = true;
        }

        if best.as_ref().map_or(true, |b| cluster.len() > b.len()) {
            best = Some(cluster.clone());
        }
        for &idx in &cluster {
            used[idx] = true;
        }
    }

    best.filter(|c| c.len() >= min_cluster_size)
}
