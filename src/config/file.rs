//! Configuration file management
//!
//! Handles finding, loading, and validating configuration files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::BenchConfig;
use crate::models::TestRunConfig;

/// Configuration file locations (in order of precedence)
pub const CONFIG_LOCATIONS: &[&str] = &[
    "./rf-bench.yaml",
    "./rf-bench.yml",
    "./.rf-bench.yaml",
    "~/.config/rf-bench/config.yaml",
];

impl BenchConfig {
    /// Find configuration file in standard locations
    pub fn find() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|location| expand_path(location))
            .find(|path| path.exists())
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        match Self::find() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = read_structured(path)?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        debug!("Loaded bench config from {}", path.display());
        Ok(config)
    }
}

/// Load run parameters from a YAML or JSON run file
pub fn load_run_file(path: impl AsRef<Path>) -> Result<TestRunConfig> {
    read_structured(path.as_ref())
}

fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    if is_yaml_file(path) {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML: {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON: {}", path.display()))
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SupplyMode;
    use tempfile::tempdir;

    #[test]
    fn test_load_yaml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rf-bench.yaml");
        std::fs::write(
            &path,
            "timing:\n  poll_interval_secs: 15\n  tolerance_celsius: 0.5\nscreenshots:\n  dir: /tmp/shots\n",
        )
        .unwrap();

        let config = BenchConfig::load(&path).unwrap();
        assert_eq!(config.timing.poll_interval_secs, 15);
        assert_eq!(config.timing.tolerance_celsius, 0.5);
        assert_eq!(config.screenshots.dir, Some(PathBuf::from("/tmp/shots")));
    }

    #[test]
    fn test_load_json_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.json");
        std::fs::write(&path, r#"{"calibration": {"step_db": 0.1}}"#).unwrap();

        let config = BenchConfig::load(&path).unwrap();
        assert_eq!(config.calibration.step_db, 0.1);
        assert_eq!(config.calibration.max_iterations, 40);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rf-bench.yaml");
        std::fs::write(&path, "timing:\n  poll_interval_secs: 0\n").unwrap();

        let err = BenchConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BenchConfig::load("/nonexistent/rf-bench.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }

    #[test]
    fn test_load_run_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(
            &path,
            "project: P-1234\n\
             center_frequency: 169612500\n\
             channel_width: 12500\n\
             nominal_voltage: 12\n\
             extreme_conditions: true\n\
             temperature_range: { min: -20, max: 55 }\n\
             voltage_range: { min: 10.8, max: 13.2 }\n",
        )
        .unwrap();

        let run = load_run_file(&path).unwrap();
        assert_eq!(run.project.as_deref(), Some("P-1234"));
        assert_eq!(run.center_frequency, 169_612_500);
        assert!(run.extreme_conditions);
        assert_eq!(run.supply, SupplyMode::Dc);
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("./rf-bench.yaml"), PathBuf::from("./rf-bench.yaml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_path("~/.config/rf-bench/config.yaml"),
                home.join(".config/rf-bench/config.yaml")
            );
        }
    }
}
