//! Environmental condition points

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named environmental condition of the test matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionLabel {
    Normal,
    #[serde(rename = "MaxTemp-MinVolt")]
    MaxTempMinVolt,
    #[serde(rename = "MaxTemp-MaxVolt")]
    MaxTempMaxVolt,
    #[serde(rename = "MinTemp-MinVolt")]
    MinTempMinVolt,
    #[serde(rename = "MinTemp-MaxVolt")]
    MinTempMaxVolt,
}

impl ConditionLabel {
    pub fn name(&self) -> &'static str {
        match self {
            ConditionLabel::Normal => "Normal",
            ConditionLabel::MaxTempMinVolt => "MaxTemp-MinVolt",
            ConditionLabel::MaxTempMaxVolt => "MaxTemp-MaxVolt",
            ConditionLabel::MinTempMinVolt => "MinTemp-MinVolt",
            ConditionLabel::MinTempMaxVolt => "MinTemp-MaxVolt",
        }
    }

    pub fn is_extreme(&self) -> bool {
        !matches!(self, ConditionLabel::Normal)
    }
}

impl fmt::Display for ConditionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One point of the test matrix
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionPoint {
    pub label: ConditionLabel,
    /// Chamber set point, °C; `None` means ambient with no chamber action
    pub temperature: Option<f64>,
    /// Supply voltage, V
    pub voltage: f64,
}

impl ConditionPoint {
    pub fn normal(voltage: f64) -> Self {
        Self {
            label: ConditionLabel::Normal,
            temperature: None,
            voltage,
        }
    }

    pub fn extreme(label: ConditionLabel, temperature: f64, voltage: f64) -> Self {
        Self {
            label,
            temperature: Some(temperature),
            voltage,
        }
    }
}

impl fmt::Display for ConditionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temperature {
            Some(t) => write!(f, "{} ({} °C, {} V)", self.label, t, self.voltage),
            None => write!(f, "{} (ambient, {} V)", self.label, self.voltage),
        }
    }
}
