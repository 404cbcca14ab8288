//! Confirms a group of runs shares a physical starting point, then finds the
//! longest shared road interval on the lap-local distance axis so every
//! participating run can be compared at equal road length.

pub mod clustering;
pub mod interpolate;
pub mod sweep;

pub use clustering::{largest_cluster, ClusterCandidate};
pub use interpolate::{sample_at_distance, SampledPoint};
pub use sweep::{fully_covered_intervals, merge_intervals, single_gate, Interval};
