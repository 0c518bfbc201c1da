//! Instrument collaborators
//!
//! The orchestrator drives a spectrum analyzer, a power supply and a climate
//! chamber through these traits. Implementations own their connection
//! lifecycle; every method is an already-connected round trip.

mod bands;
mod screenshot;
pub mod sim;

pub use bands::{BandTable, FrequencyBand};
pub use screenshot::{DirectorySink, ScreenshotHandle, ScreenshotNaming, ScreenshotSink};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::standard::{Detector, LimitPoint};

/// Errors reported by instrument collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Command rejected: {0}")]
    Rejected(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),
}

pub type InstrumentResult<T> = std::result::Result<T, InstrumentError>;

/// Instrument roles on the bench
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    SpectrumAnalyzer,
    PowerSupply,
    ClimateChamber,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKind::SpectrumAnalyzer => write!(f, "Spectrum analyzer"),
            InstrumentKind::PowerSupply => write!(f, "Power supply"),
            InstrumentKind::ClimateChamber => write!(f, "Climate chamber"),
        }
    }
}

/// Analyzer trace modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceMode {
    ClearWrite,
    View,
    Average,
    MaxHold,
    MinHold,
    Blank,
}

impl fmt::Display for TraceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceMode::ClearWrite => "write",
            TraceMode::View => "view",
            TraceMode::Average => "average",
            TraceMode::MaxHold => "maxhold",
            TraceMode::MinHold => "minhold",
            TraceMode::Blank => "blank",
        };
        write!(f, "{name}")
    }
}

/// Temperature range a chamber accepts, °C
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBounds {
    pub min: f64,
    pub max: f64,
}

impl TemperatureBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, temperature: f64) -> bool {
        self.min <= temperature && temperature <= self.max
    }
}

impl fmt::Display for TemperatureBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} °C, {} °C]", self.min, self.max)
    }
}

#[async_trait]
pub trait SpectrumAnalyzer: Send {
    async fn set_center_frequency(&mut self, hz: u64) -> InstrumentResult<()>;
    async fn set_span(&mut self, hz: u64) -> InstrumentResult<()>;
    async fn set_resolution_bandwidth(&mut self, hz: f64) -> InstrumentResult<()>;
    async fn set_video_bandwidth_ratio(&mut self, ratio: u32) -> InstrumentResult<()>;
    async fn set_detector(&mut self, detector: Detector) -> InstrumentResult<()>;
    async fn set_trace_mode(&mut self, trace: u8, mode: TraceMode) -> InstrumentResult<()>;

    /// Run the built-in occupied bandwidth measurement, result in Hz
    async fn measure_occupied_bandwidth(&mut self) -> InstrumentResult<f64>;

    /// Replace limit line 1 with the given upper-limit breakpoints and enable it
    async fn apply_limit_line(&mut self, points: &[LimitPoint]) -> InstrumentResult<()>;

    /// `true` when the trace stays below the active limit line
    async fn check_limit_line(&mut self) -> InstrumentResult<bool>;

    async fn set_reference_level_offset(&mut self, db: f64) -> InstrumentResult<()>;

    /// Peak search on marker 1, level in dBm
    async fn peak_marker_level(&mut self) -> InstrumentResult<f64>;

    async fn reset(&mut self) -> InstrumentResult<()>;
    async fn screenshot(&mut self, name: &str) -> InstrumentResult<ScreenshotHandle>;
}

#[async_trait]
pub trait PowerSupply: Send {
    /// Switch to DC mode and enable the output at `volts`
    async fn set_voltage_dc(&mut self, volts: f64) -> InstrumentResult<()>;

    /// Switch to AC mode and enable the output at `volts` / `frequency_hz`
    async fn set_voltage_ac(&mut self, volts: f64, frequency_hz: f64) -> InstrumentResult<()>;

    /// Change the amplitude without toggling the output
    async fn change_voltage(&mut self, volts: f64) -> InstrumentResult<()>;

    async fn amp_off(&mut self) -> InstrumentResult<()>;
    async fn reset(&mut self) -> InstrumentResult<()>;
}

#[async_trait]
pub trait ClimateChamber: Send {
    /// Fails with [`InstrumentError::Rejected`] outside the device range
    async fn set_temperature(&mut self, celsius: f64) -> InstrumentResult<()>;
    async fn start(&mut self) -> InstrumentResult<()>;
    async fn stop(&mut self) -> InstrumentResult<()>;
    async fn is_running(&mut self) -> InstrumentResult<bool>;
    async fn current_temperature(&mut self) -> InstrumentResult<f64>;
    fn temperature_bounds(&self) -> TemperatureBounds;
}

/// Operational frequency band lookup
pub trait FrequencyBandLookup: Send + Sync {
    fn band_for(&self, center_frequency: u64, fhss: bool) -> Option<FrequencyBand>;
}

/// Instruments exclusively owned by one run at a time
pub struct InstrumentSet {
    pub analyzer: Box<dyn SpectrumAnalyzer>,
    pub supply: Box<dyn PowerSupply>,
    pub chamber: Box<dyn ClimateChamber>,
    pub bands: Arc<dyn FrequencyBandLookup>,
    pub screenshots: Option<Arc<dyn ScreenshotSink>>,
}

impl InstrumentSet {
    pub fn new(
        analyzer: impl SpectrumAnalyzer + 'static,
        supply: impl PowerSupply + 'static,
        chamber: impl ClimateChamber + 'static,
        bands: Arc<dyn FrequencyBandLookup>,
    ) -> Self {
        Self {
            analyzer: Box::new(analyzer),
            supply: Box::new(supply),
            chamber: Box::new(chamber),
            bands,
            screenshots: None,
        }
    }

    pub fn with_screenshots(mut self, sink: Arc<dyn ScreenshotSink>) -> Self {
        self.screenshots = Some(sink);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_bounds() {
        let bounds = TemperatureBounds::new(-40.0, 180.0);
        assert!(bounds.contains(-40.0));
        assert!(bounds.contains(55.0));
        assert!(!bounds.contains(-41.0));
        assert!(!bounds.contains(180.5));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(InstrumentKind::ClimateChamber.to_string(), "Climate chamber");
        assert_eq!(TraceMode::MaxHold.to_string(), "maxhold");
        assert_eq!(TraceMode::ClearWrite.to_string(), "write");
    }
}
