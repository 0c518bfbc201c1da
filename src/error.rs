//! Run failure taxonomy

use thiserror::Error;

use crate::instruments::{InstrumentError, InstrumentKind};

/// Reasons a test run stops before producing a result
#[derive(Error, Debug)]
pub enum RunError {
    /// Invalid or missing run parameters, raised before any instrument action
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A collaborator call failed to reach the device or was refused
    #[error("{instrument} failure: {source}")]
    Instrument {
        instrument: InstrumentKind,
        source: InstrumentError,
    },

    #[error("Chamber did not settle at {target:.1} °C (last reading {reading:.1} °C)")]
    StabilizationTimeout { target: f64, reading: f64 },

    #[error("No operational band contains {center_frequency} Hz (FHSS: {fhss})")]
    BandNotFound { center_frequency: u64, fhss: bool },

    /// Requested by the caller; reported distinctly from success
    #[error("Run cancelled")]
    Cancelled,

    /// Another run holds the instrument set
    #[error("A run is already active on this bench")]
    Busy,

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl RunError {
    pub fn instrument(instrument: InstrumentKind, source: InstrumentError) -> Self {
        RunError::Instrument { instrument, source }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        RunError::Configuration(message.into())
    }

    /// Short machine-readable kind, used in JSON output and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Configuration(_) => "configuration",
            RunError::Instrument { .. } => "instrument",
            RunError::StabilizationTimeout { .. } => "stabilization_timeout",
            RunError::BandNotFound { .. } => "band_not_found",
            RunError::Cancelled => "cancelled",
            RunError::Busy => "busy",
            RunError::Unexpected(_) => "unexpected",
        }
    }
}
