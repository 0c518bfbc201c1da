//! Frequency unit helpers
//!
//! Parses operator input such as `169.6125MHz` into integer hertz and formats
//! hertz back into a readable unit.

use anyhow::{bail, Context, Result};

/// Frequency unit multiples accepted on input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrequencyUnit {
    Hz,
    KHz,
    MHz,
    GHz,
}

impl FrequencyUnit {
    pub fn multiplier(self) -> f64 {
        match self {
            FrequencyUnit::Hz => 1.0,
            FrequencyUnit::KHz => 1e3,
            FrequencyUnit::MHz => 1e6,
            FrequencyUnit::GHz => 1e9,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "hz" => Some(FrequencyUnit::Hz),
            "k" | "khz" => Some(FrequencyUnit::KHz),
            "m" | "mhz" => Some(FrequencyUnit::MHz),
            "g" | "ghz" => Some(FrequencyUnit::GHz),
            _ => None,
        }
    }
}

/// Parse a frequency with an optional unit suffix into whole hertz.
///
/// The value is truncated to an integer number of hertz.
pub fn parse_frequency(input: &str) -> Result<u64> {
    let input = input.trim();
    let split = input
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: f64 = number
        .trim()
        .parse()
        .with_context(|| format!("Invalid frequency value: {input}"))?;
    let unit = FrequencyUnit::from_str(unit)
        .with_context(|| format!("Unknown frequency unit in: {input}"))?;

    if !value.is_finite() || value <= 0.0 {
        bail!("Frequency must be positive: {input}");
    }

    // Round away float noise before truncating (169.6125 * 1e6 is not exact).
    let hz = (value * unit.multiplier() * 1e3).round() / 1e3;
    Ok(hz as u64)
}

/// Format a frequency in hertz with the largest fitting unit, three decimals.
pub fn format_frequency(hz: f64) -> String {
    if hz / 1e9 > 1.0 {
        format!("{:.3} GHz", hz / 1e9)
    } else if hz / 1e6 > 1.0 {
        format!("{:.3} MHz", hz / 1e6)
    } else if hz / 1e3 > 1.0 {
        format!("{:.3} kHz", hz / 1e3)
    } else {
        format!("{hz} Hz")
    }
}
