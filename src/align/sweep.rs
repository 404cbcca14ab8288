//! Sweep-line intersection of per-lap coverage intervals on the shared
//! distance axis, used once start-point clustering has confirmed laps are
//! comparable.

use std::collections::HashSet;

/// A closed interval `[start, end]` on the distance axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

/// Merge touching/overlapping intervals for one lap. Input need not be
/// sorted; output is sorted and non-overlapping.
pub fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());
    let mut merged: Vec<Interval> = Vec::new();
    for interval in intervals {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    position: f64,
    kind: EventKind,
    lap_index: u32,
}

/// Sweep the combined event list for all laps' merged intervals, returning
/// every maximal sub-interval during which all `required_laps` are open
/// simultaneously.
pub fn fully_covered_intervals(
    per_lap_intervals: &[(u32, Vec<Interval>)],
    required_laps: &[u32],
) -> Vec<Interval> {
    let required: HashSet<u32> = required_laps.iter().copied().collect();
    let mut events = Vec::new();

    for (lap_index, intervals) in per_lap_intervals {
        for interval in merge_intervals(intervals.clone()) {
            events.push(Event {
                position: interval.start,
                kind: EventKind::Open,
                lap_index: *lap_index,
            });
            events.push(Event {
                position: interval.end,
                kind: EventKind::Close,
                lap_index: *lap_index,
            });
        }
    }

    // Opens before closes at the same position, so an instantaneous
    // adjoining interval does not create a spurious gap.
    events.sort_by(|a, b| {
        a.position
            .partial_cmp(&b.position)
            .unwrap()
            .then_with(|| match (a.kind, b.kind) {
                (EventKind::Open, EventKind::Close) => std::cmp::Ordering::Less,
                (EventKind::Close, EventKind::Open) => std::cmp::Ordering::Greater,
                _ => std::cmp::Ordering::Equal,
            })
    });

    let mut open: HashSet<u32> = HashSet::new();
    let mut result = Vec::new();
    let mut covered_start: Option<f64> = None;

    for event in &events {
        match event.kind {
            EventKind::Open => {
                open.insert(event.lap_index);
                if required.is_subset(&open) && covered_start.is_none() {
                    covered_start = Some(event.position);
                }
            }
            EventKind::Close => {
                if let Some(start) = covered_start {
                    if required.is_subset(&open) {
                        result.push(Interval {
                            start,
                            end: event.position,
                        });
                    }
                    covered_start = None;
                }
                open.remove(&event.lap_index);
            }
        }
    }

    result
}

/// Special case of [`fully_covered_intervals`] for the coast-down protocol's
/// single shared gate: `[max(starts), min(ends)]` when positive, else `None`.
pub fn single_gate(starts: &[f64], ends: &[f64]) -> Option<Interval> {
    let entry = starts.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exit = ends.iter().cloned().fold(f64::INFINITY, f64::min);
    if exit > entry {
        Some(Interval { start: entry, end: exit })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_overlapping_and_touching_intervals() {
        let merged = merge_intervals(vec![
            Interval { start: 0.0, end: 50.0 },
            Interval { start: 50.0, end: 80.0 },
            Interval { start: 90.0, end: 120.0 },
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], Interval { start: 0.0, end: 80.0 });
    }

    #[test]
    fn single_gate_is_max_start_min_end() {
        let gate = single_gate(&[0.0, 5.0, 10.0], &[200.0, 195.0, 210.0]).unwrap();
        assert_eq!(gate.start, 10.0);
        assert_eq!(gate.end, 195.0);
    }

    #[test]
    fn single_gate_negative_span_is_none() {
        assert!(single_gate(&[100.0], &[50.0]).is_none());
    }

    #[test]
    fn sweep_line_with_holes_finds_two_segments() {
        // Lap A: [0,50] u [80,120]; Lap B: [10,100]; Lap C: [20,90]
        let per_lap = vec![
            (
                0u32,
                vec![
                    Interval { start: 0.0, end: 50.0 },
                    Interval { start: 80.0, end: 120.0 },
                ],
            ),
            (1u32, vec![Interval { start: 10.0, end: 100.0 }]),
            (2u32, vec![Interval { start: 20.0, end: 90.0 }]),
        ];
        let covered = fully_covered_intervals(&per_lap, &[0, 1, 2]);
        assert_eq!(covered.len(), 2);
        assert_eq!(covered[0], Interval { start: 20.0, end: 50.0 });
        assert_eq!(covered[1], Interval { start: 80.0, end: 90.0 });
    }

    #[test]
    fn intersection_matches_max_start_min_end_invariant() {
        let per_lap = vec![
            (0u32, vec![Interval { start: 5.0, end: 40.0 }]),
            (1u32, vec![Interval { start: 10.0, end: 30.0 }]),
        ];
        let covered = fully_covered_intervals(&per_lap, &[0, 1]);
        assert_eq!(covered, vec![Interval { start: 10.0, end: 30.0 }]);
    }
}
