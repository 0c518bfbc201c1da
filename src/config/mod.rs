//! Configuration module
//!
//! Bench-level settings: chamber timing, calibration, band tables and
//! screenshot storage. Run parameters live in [`crate::models::TestRunConfig`].

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::{load_run_file, CONFIG_LOCATIONS};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Bench configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub calibration: CalibrationConfig,

    #[serde(default)]
    pub bands: BandTableConfig,

    #[serde(default)]
    pub screenshots: ScreenshotConfig,
}

/// Chamber stabilization and settle delays
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Chamber polling interval
    pub poll_interval_secs: u64,

    /// Time allowed for the chamber to reach the set point
    pub primary_budget_secs: u64,

    /// Extra time granted once when the primary budget runs out
    pub grace_window_secs: u64,

    /// Accepted distance from the set point, °C
    pub tolerance_celsius: f64,

    /// Delay after a supply voltage change
    pub voltage_settle_ms: u64,

    /// Delay for the analyzer trace to build up before reading
    pub sweep_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            primary_budget_secs: 45 * 60,
            grace_window_secs: 10 * 60,
            tolerance_celsius: 1.0,
            voltage_settle_ms: 2000,
            sweep_settle_ms: 4000,
        }
    }
}

impl TimingConfig {
    /// Short delays for rehearsing a run against simulated instruments
    pub fn simulation() -> Self {
        Self {
            poll_interval_secs: 1,
            primary_budget_secs: 120,
            grace_window_secs: 30,
            tolerance_celsius: 1.0,
            voltage_settle_ms: 50,
            sweep_settle_ms: 100,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn primary_budget(&self) -> Duration {
        Duration::from_secs(self.primary_budget_secs)
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }

    pub fn voltage_settle(&self) -> Duration {
        Duration::from_millis(self.voltage_settle_ms)
    }

    pub fn sweep_settle(&self) -> Duration {
        Duration::from_millis(self.sweep_settle_ms)
    }
}

/// ERP reference level calibration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Reference level offset increment, dB
    pub step_db: f64,

    /// Peak-to-reference distance accepted without adjustment, dB
    pub tolerance_db: f64,

    pub max_iterations: u32,

    /// Analyzer RBW used for the peak reading, Hz
    pub resolution_bandwidth: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            step_db: 0.5,
            tolerance_db: 0.25,
            max_iterations: 40,
            resolution_bandwidth: 100_000.0,
        }
    }
}

/// Operational band tables; the built-in SRD table is used when unset
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BandTableConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub fhss_path: Option<PathBuf>,
}

/// Where analyzer screenshots are stored; disabled when unset
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl BenchConfig {
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let timing = &self.timing;
        if timing.poll_interval_secs == 0 {
            anyhow::bail!("Chamber poll interval must be at least 1 second");
        }
        if timing.primary_budget_secs < timing.poll_interval_secs {
            anyhow::bail!(
                "Stabilization budget ({}s) is shorter than the poll interval ({}s)",
                timing.primary_budget_secs,
                timing.poll_interval_secs
            );
        }
        if !(timing.tolerance_celsius > 0.0) {
            anyhow::bail!(
                "Temperature tolerance must be positive, got {}",
                timing.tolerance_celsius
            );
        }

        let calibration = &self.calibration;
        if !(calibration.step_db > 0.0) || !(calibration.tolerance_db > 0.0) {
            anyhow::bail!("Calibration step and tolerance must be positive");
        }
        if calibration.max_iterations == 0 {
            anyhow::bail!("Calibration needs at least one iteration");
        }
        if self.bands.fhss_path.is_some() && self.bands.path.is_none() {
            anyhow::bail!("An FHSS band table requires the main band table path");
        }

        Ok(())
    }
}
