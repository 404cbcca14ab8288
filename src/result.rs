//! Packages a protocol's regression output into the figures a rider acts
//! on: recommended front/rear pressures, expressed via the bike's
//! front/rear distribution ratio.

use crate::config::{AnalysisConfig, BikeType};
use crate::regression::{Confidence, RegressionPoint, RegressionResult};

/// Which analysis pipeline produced a [`AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    ConstantPower,
    Circle,
    CoastDown,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::ConstantPower => "constant_power",
            Protocol::Circle => "circle",
            Protocol::CoastDown => "coast_down",
        }
    }
}

/// Front/rear pressure recommendation derived from a rear-axis optimum and
/// the bike's distribution ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendedPressures {
    pub rear: f64,
    pub front: f64,
}

impl RecommendedPressures {
    /// `front = ratio * rear`, per [`AnalysisConfig::silca_ratio`].
    pub fn from_rear_optimum(rear_optimum: f64, config: &AnalysisConfig, bike_type: BikeType) -> Self {
        Self {
            rear: rear_optimum,
            front: config.silca_ratio(bike_type) * rear_optimum,
        }
    }
}

/// The complete outcome of running one protocol end to end: the regression
/// itself, the points it was fit from, and the recommendation derived from
/// its optimum.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub protocol: Protocol,
    pub points: Vec<RegressionPoint>,
    pub regression: RegressionResult,
    pub recommended: RecommendedPressures,
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    pub fn confidence(&self) -> Confidence {
        self.regression.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recommended_pressures_apply_bike_type_ratio() {
        let config = AnalysisConfig::default();
        let recommended = RecommendedPressures::from_rear_optimum(70.0, &config, BikeType::Road);
        assert_eq!(recommended.rear, 70.0);
        assert!((recommended.front - 70.0 * 0.923).abs() < 1e-9);
    }

    #[test]
    fn time_trial_ratio_is_unity() {
        let config = AnalysisConfig::default();
        let recommended = RecommendedPressures::from_rear_optimum(80.0, &config, BikeType::TimeTrial);
        assert_eq!(recommended.front, recommended.rear);
    }
}
