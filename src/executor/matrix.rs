//! Condition matrix construction

use crate::models::{ConditionLabel, ConditionPoint, TestRunConfig};

/// Build the ordered list of environmental conditions for a run.
///
/// Extreme points are grouped by temperature so the chamber moves twice.
/// The config is assumed validated; missing ranges fall back to nominal-only.
pub fn build_condition_matrix(config: &TestRunConfig) -> Vec<ConditionPoint> {
    let mut matrix = vec![ConditionPoint::normal(config.nominal_voltage)];

    if !config.extreme_conditions {
        return matrix;
    }

    let (Some(temperature), Some(voltage)) = (config.temperature_range, config.voltage_range)
    else {
        return matrix;
    };

    matrix.extend([
        ConditionPoint::extreme(ConditionLabel::MaxTempMinVolt, temperature.max, voltage.min),
        ConditionPoint::extreme(ConditionLabel::MaxTempMaxVolt, temperature.max, voltage.max),
        ConditionPoint::extreme(ConditionLabel::MinTempMinVolt, temperature.min, voltage.min),
        ConditionPoint::extreme(ConditionLabel::MinTempMaxVolt, temperature.min, voltage.max),
    ]);
    matrix
}
