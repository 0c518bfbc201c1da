//! Output formatters for run results
//!
//! Provides Table, JSON, CSV and summary output formats.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::models::{RunOutcome, RunResult, StepResult};
use crate::utils::format_frequency;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Serialized shape of a run outcome
#[derive(Serialize)]
struct OutcomeJson<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a RunResult>,
}

impl<'a> From<&'a RunOutcome> for OutcomeJson<'a> {
    fn from(outcome: &'a RunOutcome) -> Self {
        match outcome {
            RunOutcome::Completed(result) => Self {
                status: "completed",
                error_kind: None,
                error: None,
                result: Some(result),
            },
            RunOutcome::Cancelled => Self {
                status: "cancelled",
                error_kind: None,
                error: None,
                result: None,
            },
            RunOutcome::Failed(err) => Self {
                status: "failed",
                error_kind: Some(err.kind()),
                error: Some(err.to_string()),
                result: None,
            },
        }
    }
}

/// One CSV row per condition
#[derive(Serialize)]
struct StepRow<'a> {
    condition: &'a str,
    temperature_c: Option<f64>,
    voltage_v: f64,
    occupied_bandwidth_hz: Option<f64>,
    operating_channel: &'static str,
    operational_band: &'static str,
    duration_ms: u64,
}

impl<'a> From<&'a StepResult> for StepRow<'a> {
    fn from(step: &'a StepResult) -> Self {
        Self {
            condition: step.condition.label.name(),
            temperature_c: step.condition.temperature,
            voltage_v: step.condition.voltage,
            occupied_bandwidth_hz: step.occupied_bandwidth,
            operating_channel: verdict(step.operating_channel_pass),
            operational_band: verdict(step.operational_band_pass),
            duration_ms: step.duration_ms,
        }
    }
}

fn verdict(pass: Option<bool>) -> &'static str {
    match pass {
        Some(true) => "PASS",
        Some(false) => "FAIL",
        None => "",
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format the outcome of a run
    pub fn format_outcome(&self, outcome: &RunOutcome) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string(&OutcomeJson::from(outcome)).unwrap_or_default()
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(&OutcomeJson::from(outcome)).unwrap_or_default()
            }
            OutputFormat::Csv => match outcome {
                RunOutcome::Completed(result) => self.format_result_csv(result),
                _ => String::new(),
            },
            OutputFormat::Table | OutputFormat::Summary => match outcome {
                RunOutcome::Completed(result) => self.format_result(result),
                RunOutcome::Cancelled => self.paint("Run cancelled; instruments powered down", 33),
                RunOutcome::Failed(err) => self.paint(&format!("Run failed: {err}"), 31),
            },
        }
    }

    /// Format a completed run
    pub fn format_result(&self, result: &RunResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Csv => self.format_result_csv(result),
            OutputFormat::Summary => self.format_result_summary(result),
        }
    }

    fn format_result_table(&self, result: &RunResult) -> String {
        let mut output = String::new();

        output.push_str("\n┌──────────────────┬──────────┬─────────┬──────────────┬───────┬───────┬──────────┐\n");
        output.push_str("│ Condition        │ Temp     │ Voltage │ OBW          │ OC    │ OFB   │ Duration │\n");
        output.push_str("├──────────────────┼──────────┼─────────┼──────────────┼───────┼───────┼──────────┤\n");

        for step in &result.steps {
            let temperature = step
                .condition
                .temperature
                .map(|t| format!("{t:.1} °C"))
                .unwrap_or_else(|| "ambient".to_string());
            let bandwidth = step
                .occupied_bandwidth
                .map(format_frequency)
                .unwrap_or_else(|| "-".to_string());

            output.push_str(&format!(
                "│ {:16} │ {:>8} │ {:>5.1} V │ {:>12} │ {} │ {} │ {:>6}ms │\n",
                step.condition.label.name(),
                temperature,
                step.condition.voltage,
                bandwidth,
                self.verdict_cell(step.operating_channel_pass),
                self.verdict_cell(step.operational_band_pass),
                step.duration_ms
            ));
        }

        output.push_str("└──────────────────┴──────────┴─────────┴──────────────┴───────┴───────┴──────────┘\n");

        let summary = &result.summary;
        if let (Some(min), Some(max)) = (summary.min_bandwidth, summary.max_bandwidth) {
            output.push_str(&format!(
                " Occupied bandwidth: min {} | max {}\n",
                format_frequency(min),
                format_frequency(max)
            ));
        }
        if let Some(offset) = result.erp_offset_db {
            output.push_str(&format!(" Reference level offset: {offset:+.2} dB\n"));
        }
        output.push_str(&format!(
            " Operating channel: {} | Operational band: {} | Duration: {}ms\n",
            self.verdict_cell(result.summary.operating_channel_pass).trim(),
            self.verdict_cell(result.summary.operational_band_pass).trim(),
            result.duration_ms
        ));
        if !result.screenshots.is_empty() {
            output.push_str(&format!(" Screenshots: {}\n", result.screenshots.len()));
        }

        output
    }

    fn verdict_cell(&self, pass: Option<bool>) -> String {
        match pass {
            Some(true) => self.paint(" PASS", 32),
            Some(false) => self.paint(" FAIL", 31),
            None => "    -".to_string(),
        }
    }

    fn paint(&self, text: &str, color: u8) -> String {
        if self.colorize {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn format_result_csv(&self, result: &RunResult) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for step in &result.steps {
            if writer.serialize(StepRow::from(step)).is_err() {
                return String::new();
            }
        }
        writer
            .into_inner()
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_default()
    }

    fn format_result_summary(&self, result: &RunResult) -> String {
        let passed = result.steps.iter().filter(|s| s.passed()).count();
        format!(
            "{}/{} condition(s) passed, OBW {} - {} in {}ms",
            passed,
            result.steps.len(),
            result
                .summary
                .min_bandwidth
                .map(format_frequency)
                .unwrap_or_else(|| "-".to_string()),
            result
                .summary
                .max_bandwidth
                .map(format_frequency)
                .unwrap_or_else(|| "-".to_string()),
            result.duration_ms
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a run result to a file
pub fn write_result_to_file(path: &str, result: &RunResult, format: OutputFormat) -> Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_result(result);

    let mut file =
        std::fs::File::create(path).with_context(|| format!("Failed to create {path}"))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {path}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;
    use crate::models::{ConditionLabel, ConditionPoint, RunSummary};
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample() -> RunResult {
        let mut normal = StepResult::new(ConditionPoint::normal(12.0));
        normal.occupied_bandwidth = Some(9_800.0);
        normal.operating_channel_pass = Some(true);
        normal.operational_band_pass = Some(true);

        let mut extreme =
            StepResult::new(ConditionPoint::extreme(ConditionLabel::MaxTempMinVolt, 55.0, 10.8));
        extreme.occupied_bandwidth = Some(10_100.0);
        extreme.operating_channel_pass = Some(false);
        extreme.operational_band_pass = Some(true);

        RunResult {
            started_at: Utc::now(),
            duration_ms: 1234,
            erp_offset_db: Some(1.5),
            screenshots: Vec::new(),
            summary: RunSummary {
                min_bandwidth: Some(9_800.0),
                max_bandwidth: Some(10_100.0),
                operating_channel_pass: Some(false),
                operational_band_pass: Some(true),
            },
            steps: vec![normal, extreme],
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TABLE"), Some(OutputFormat::Table));
        assert_eq!(OutputFormat::from_str("json-pretty"), Some(OutputFormat::JsonPretty));
        assert_eq!(OutputFormat::from_str("unknown"), None);
    }

    #[test]
    fn test_table_output() {
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_result(&sample());
        assert!(output.contains("MaxTemp-MinVolt"));
        assert!(output.contains("55.0 °C"));
        assert!(output.contains("9.800 kHz"));
        assert!(output.contains("Operating channel: FAIL | Operational band: PASS"));
        assert!(output.contains("+1.50 dB"));
        assert!(!output.contains("\x1b["));
    }

    #[test]
    fn test_csv_output() {
        let output = ResultFormatter::new(OutputFormat::Csv).format_result(&sample());
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "condition,temperature_c,voltage_v,occupied_bandwidth_hz,operating_channel,operational_band,duration_ms"
        );
        assert!(lines[1].starts_with("Normal,,12.0,9800.0,PASS,PASS"));
        assert!(lines[2].starts_with("MaxTemp-MinVolt,55.0,10.8,10100.0,FAIL,PASS"));
    }

    #[test]
    fn test_outcome_json() {
        let formatter = ResultFormatter::new(OutputFormat::Json);

        let failed = RunOutcome::Failed(RunError::BandNotFound {
            center_frequency: 100_000_000,
            fhss: false,
        });
        let value: serde_json::Value =
            serde_json::from_str(&formatter.format_outcome(&failed)).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error_kind"], "band_not_found");
        assert!(value.get("result").is_none());

        let completed = RunOutcome::Completed(sample());
        let value: serde_json::Value =
            serde_json::from_str(&formatter.format_outcome(&completed)).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["result"]["steps"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_outcome_text() {
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_outcome(&RunOutcome::Cancelled);
        assert!(output.contains("cancelled"));
    }

    #[test]
    fn test_write_result_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        let path = path.to_str().unwrap();

        write_result_to_file(path, &sample(), OutputFormat::Json).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        let loaded: RunResult = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.steps.len(), 2);
    }
}
