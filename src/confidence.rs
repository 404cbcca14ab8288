//! Confidence tagging: thresholds on R-squared and cross-lap power spread,
//! shared by every protocol's regression result.

use crate::regression::Confidence;

/// Derive a confidence tag and optional warning from fit quality, point
/// count, and (for constant-power/circle) a cross-lap power-CV statistic.
pub fn classify(
    r_squared: f64,
    point_count: usize,
    power_cv: Option<f64>,
    min_quadratic_points: usize,
    power_cv_warn_threshold: f64,
) -> (Confidence, Option<String>) {
    if point_count < min_quadratic_points {
        return (Confidence::Low, Some(format!("Only {point_count} data points")));
    }

    let mut confidence = if r_squared >= 0.85 {
        Confidence::High
    } else if r_squared >= 0.70 {
        Confidence::Medium
    } else {
        Confidence::Low
    };
    let mut warning = if confidence == Confidence::Low {
        Some("data noisy, results may be unreliable".to_string())
    } else {
        None
    };

    if let Some(cv) = power_cv {
        if cv > power_cv_warn_threshold {
            confidence = demote(confidence);
            let power_warning = "power varied more than 25% across runs".to_string();
            warning = Some(match warning {
                Some(existing) => format!("{existing}; {power_warning}"),
                None => power_warning,
            });
        }
    }

    (confidence, warning)
}

fn demote(confidence: Confidence) -> Confidence {
    match confidence {
        Confidence::High => Confidence::Medium,
        Confidence::Medium => Confidence::Low,
        Confidence::Low => Confidence::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_r_squared_without_power_cv_is_high() {
        let (confidence, warning) = classify(0.90, 10, None, 3, 0.25);
        assert_eq!(confidence, Confidence::High);
        assert!(warning.is_none());
    }

    #[test]
    fn medium_band_is_medium() {
        let (confidence, _) = classify(0.75, 10, None, 3, 0.25);
        assert_eq!(confidence, Confidence::Medium);
    }

    #[test]
    fn low_r_squared_carries_noisy_warning() {
        let (confidence, warning) = classify(0.5, 10, None, 3, 0.25);
        assert_eq!(confidence, Confidence::Low);
        assert_eq!(warning.as_deref(), Some("data noisy, results may be unreliable"));
    }

    #[test]
    fn high_power_cv_demotes_one_step() {
        let (confidence, warning) = classify(0.90, 10, Some(0.30), 3, 0.25);
        assert_eq!(confidence, Confidence::Medium);
        assert!(warning.unwrap().contains("power varied"));
    }

    #[test]
    fn low_confidence_is_not_further_demoted() {
        let (confidence, _) = classify(0.5, 10, Some(0.30), 3, 0.25);
        assert_eq!(confidence, Confidence::Low);
    }

    #[test]
    fn below_min_points_is_low_regardless_of_fit_quality() {
        let (confidence, warning) = classify(0.99, 2, None, 3, 0.25);
        assert_eq!(confidence, Confidence::Low);
        assert_eq!(warning.as_deref(), Some("Only 2 data points"));
    }

    #[test]
    fn monotonicity_raising_r_squared_never_worsens_confidence() {
        let (low, _) = classify(0.5, 10, None, 3, 0.25);
        let (high, _) = classify(0.95, 10, None, 3, 0.25);
        assert!(matches!(low, Confidence::Low));
        assert!(matches!(high, Confidence::High));
    }

    #[test]
    fn monotonicity_lowering_power_cv_never_worsens_confidence() {
        let (with_high_cv, _) = classify(0.90, 10, Some(0.40), 3, 0.25);
        let (with_low_cv, _) = classify(0.90, 10, Some(0.10), 3, 0.25);
        assert_eq!(with_high_cv, Confidence::Medium);
        assert_eq!(with_low_cv, Confidence::High);
    }
}
