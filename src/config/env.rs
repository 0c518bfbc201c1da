//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use std::path::PathBuf;

use super::BenchConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "RF_BENCH";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvConfig {
    /// Config file from RF_BENCH_CONFIG
    pub config_file: Option<String>,
    /// Poll interval from RF_BENCH_POLL_INTERVAL (seconds)
    pub poll_interval: Option<u64>,
    /// Stabilization budget from RF_BENCH_PRIMARY_BUDGET (seconds)
    pub primary_budget: Option<u64>,
    /// Grace window from RF_BENCH_GRACE_WINDOW (seconds)
    pub grace_window: Option<u64>,
    /// Tolerance from RF_BENCH_TOLERANCE (°C)
    pub tolerance: Option<f64>,
    /// Band table from RF_BENCH_BANDS
    pub bands: Option<String>,
    /// FHSS band table from RF_BENCH_FHSS_BANDS
    pub fhss_bands: Option<String>,
    /// Screenshot directory from RF_BENCH_SCREENSHOTS
    pub screenshots: Option<String>,
    /// Verbose from RF_BENCH_VERBOSE
    pub verbose: Option<bool>,
    /// Output format from RF_BENCH_FORMAT
    pub format: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            config_file: get_env("CONFIG"),
            poll_interval: get_env_parse("POLL_INTERVAL"),
            primary_budget: get_env_parse("PRIMARY_BUDGET"),
            grace_window: get_env_parse("GRACE_WINDOW"),
            tolerance: get_env_parse("TOLERANCE"),
            bands: get_env("BANDS"),
            fhss_bands: get_env("FHSS_BANDS"),
            screenshots: get_env("SCREENSHOTS"),
            verbose: get_env_bool("VERBOSE"),
            format: get_env("FORMAT"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        *self != Self::default()
    }

    /// Override file or default settings with the environment
    pub fn apply(&self, config: &mut BenchConfig) {
        if let Some(secs) = self.poll_interval {
            config.timing.poll_interval_secs = secs;
        }
        if let Some(secs) = self.primary_budget {
            config.timing.primary_budget_secs = secs;
        }
        if let Some(secs) = self.grace_window {
            config.timing.grace_window_secs = secs;
        }
        if let Some(tolerance) = self.tolerance {
            config.timing.tolerance_celsius = tolerance;
        }
        if let Some(path) = &self.bands {
            config.bands.path = Some(PathBuf::from(path));
        }
        if let Some(path) = &self.fhss_bands {
            config.bands.fhss_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = &self.screenshots {
            config.screenshots.dir = Some(PathBuf::from(dir));
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_CONFIG:          {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_POLL_INTERVAL:   {:?}", ENV_PREFIX, self.poll_interval);
        println!("  {}_PRIMARY_BUDGET:  {:?}", ENV_PREFIX, self.primary_budget);
        println!("  {}_GRACE_WINDOW:    {:?}", ENV_PREFIX, self.grace_window);
        println!("  {}_TOLERANCE:       {:?}", ENV_PREFIX, self.tolerance);
        println!("  {}_BANDS:           {:?}", ENV_PREFIX, self.bands);
        println!("  {}_FHSS_BANDS:      {:?}", ENV_PREFIX, self.fhss_bands);
        println!("  {}_SCREENSHOTS:     {:?}", ENV_PREFIX, self.screenshots);
        println!("  {}_VERBOSE:         {:?}", ENV_PREFIX, self.verbose);
        println!("  {}_FORMAT:          {:?}", ENV_PREFIX, self.format);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all RF_BENCH environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_CONFIG          Bench config file (YAML or JSON)");
    println!("  {ENV_PREFIX}_POLL_INTERVAL   Chamber poll interval in seconds");
    println!("  {ENV_PREFIX}_PRIMARY_BUDGET  Chamber stabilization budget in seconds");
    println!("  {ENV_PREFIX}_GRACE_WINDOW    Extra stabilization time in seconds");
    println!("  {ENV_PREFIX}_TOLERANCE       Accepted temperature deviation in °C");
    println!("  {ENV_PREFIX}_BANDS           Operational band table (CSV)");
    println!("  {ENV_PREFIX}_FHSS_BANDS      FHSS band table (CSV)");
    println!("  {ENV_PREFIX}_SCREENSHOTS     Screenshot directory");
    println!("  {ENV_PREFIX}_VERBOSE         Enable debug logging (true/false)");
    println!("  {ENV_PREFIX}_FORMAT          Output format (table, json, json-pretty, csv)");
    println!();
    println!("  RUST_LOG                 Overrides the log filter");
}
