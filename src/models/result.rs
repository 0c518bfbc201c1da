//! Step and run results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ConditionPoint;
use crate::error::RunError;
use crate::utils::format_frequency;

/// Measurements taken at one condition point
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub condition: ConditionPoint,
    /// Occupied bandwidth, Hz
    pub occupied_bandwidth: Option<f64>,
    pub operating_channel_pass: Option<bool>,
    pub operational_band_pass: Option<bool>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn new(condition: ConditionPoint) -> Self {
        Self {
            condition,
            occupied_bandwidth: None,
            operating_channel_pass: None,
            operational_band_pass: None,
            duration_ms: 0,
        }
    }

    /// `false` if any executed limit check failed
    pub fn passed(&self) -> bool {
        self.operating_channel_pass != Some(false) && self.operational_band_pass != Some(false)
    }
}

fn verdict(pass: Option<bool>) -> &'static str {
    match pass {
        Some(true) => "PASS",
        Some(false) => "FAIL",
        None => "-",
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = if self.passed() { "✓" } else { "✗" };
        write!(f, "{} {}", symbol, self.condition)?;
        if let Some(bw) = self.occupied_bandwidth {
            write!(f, " | OBW {}", format_frequency(bw))?;
        }
        write!(
            f,
            " | OC {} | OFB {} [{}ms]",
            verdict(self.operating_channel_pass),
            verdict(self.operational_band_pass),
            self.duration_ms
        )
    }
}

/// Reduced view over all executed conditions
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub min_bandwidth: Option<f64>,
    pub max_bandwidth: Option<f64>,
    /// `None` when the operating channel check never ran
    pub operating_channel_pass: Option<bool>,
    /// `None` when the operational band check never ran
    pub operational_band_pass: Option<bool>,
}

impl RunSummary {
    pub fn is_all_passed(&self) -> bool {
        self.operating_channel_pass != Some(false) && self.operational_band_pass != Some(false)
    }
}

/// Result of a completed run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Reference level offset found by ERP calibration, dB
    pub erp_offset_db: Option<f64>,
    pub screenshots: Vec<String>,
    pub steps: Vec<StepResult>,
    pub summary: RunSummary,
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run started {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for step in &self.steps {
            writeln!(f, "  {step}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        if let (Some(min), Some(max)) = (self.summary.min_bandwidth, self.summary.max_bandwidth) {
            writeln!(
                f,
                "OBW: min {} | max {}",
                format_frequency(min),
                format_frequency(max)
            )?;
        }
        writeln!(
            f,
            "Operating channel: {} | Operational band: {} | Duration: {}s",
            verdict(self.summary.operating_channel_pass),
            verdict(self.summary.operational_band_pass),
            self.duration_ms / 1000
        )
    }
}

/// What the caller receives when a run ends
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunResult),
    Cancelled,
    Failed(RunError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn result(&self) -> Option<&RunResult> {
        match self {
            RunOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RunError> {
        match self {
            RunOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Result<RunResult, RunError>> for RunOutcome {
    fn from(result: Result<RunResult, RunError>) -> Self {
        match result {
            Ok(result) => RunOutcome::Completed(result),
            Err(RunError::Cancelled) => RunOutcome::Cancelled,
            Err(err) => RunOutcome::Failed(err),
        }
    }
}
