//! Test run configuration
//!
//! Built from operator input, validated once, then immutable for the run.

use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::instruments::TemperatureBounds;

/// Upper bound for centre frequency and channel width (analyzer range)
pub const MAX_FREQUENCY_HZ: u64 = 30_000_000_000;

/// Largest voltage the supply amplifier can deliver
pub const MAX_VOLTAGE: f64 = 270.0;

/// Accepted AC supply frequency range upper bound
pub const MAX_AC_FREQUENCY_HZ: f64 = 1000.0;

/// Accepted ERP reference range, dBm
pub const ERP_REFERENCE_RANGE_DBM: (f64, f64) = (-50.0, 50.0);

/// Inclusive {min, max} range
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// How the EUT is powered
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SupplyMode {
    #[default]
    Dc,
    Ac {
        frequency_hz: f64,
    },
}

/// Parameters of one test run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestRunConfig {
    /// Project number, used to name screenshots
    #[serde(default)]
    pub project: Option<String>,

    /// Operating frequency, Hz
    pub center_frequency: u64,

    /// Operating channel width, Hz
    pub channel_width: u64,

    /// Nominal supply voltage, V
    pub nominal_voltage: f64,

    #[serde(default)]
    pub supply: SupplyMode,

    /// Maximum e.r.p. as measured in the anechoic chamber, dBm
    #[serde(default)]
    pub erp_reference_dbm: Option<f64>,

    /// Repeat the measurements at temperature and voltage extremes
    #[serde(default)]
    pub extreme_conditions: bool,

    #[serde(default)]
    pub temperature_range: Option<ValueRange>,

    #[serde(default)]
    pub voltage_range: Option<ValueRange>,

    #[serde(default = "default_true")]
    pub run_obw: bool,

    #[serde(default = "default_true")]
    pub run_oob: bool,

    /// EUT transmits a D-M2 test signal
    #[serde(default)]
    pub dm2_signal: bool,

    /// EUT uses frequency hopping
    #[serde(default)]
    pub fhss: bool,
}

fn default_true() -> bool {
    true
}

impl TestRunConfig {
    /// Nominal-only OBW + OOB run on a DC supply
    pub fn new(center_frequency: u64, channel_width: u64, nominal_voltage: f64) -> Self {
        Self {
            project: None,
            center_frequency,
            channel_width,
            nominal_voltage,
            supply: SupplyMode::Dc,
            erp_reference_dbm: None,
            extreme_conditions: false,
            temperature_range: None,
            voltage_range: None,
            run_obw: true,
            run_oob: true,
            dm2_signal: false,
            fhss: false,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_measurements(mut self, obw: bool, oob: bool) -> Self {
        self.run_obw = obw;
        self.run_oob = oob;
        self
    }

    pub fn with_extremes(mut self, temperature: ValueRange, voltage: ValueRange) -> Self {
        self.extreme_conditions = true;
        self.temperature_range = Some(temperature);
        self.voltage_range = Some(voltage);
        self
    }

    pub fn with_supply(mut self, supply: SupplyMode) -> Self {
        self.supply = supply;
        self
    }

    pub fn with_erp_reference(mut self, dbm: f64) -> Self {
        self.erp_reference_dbm = Some(dbm);
        self
    }

    pub fn with_dm2(mut self, dm2: bool) -> Self {
        self.dm2_signal = dm2;
        self
    }

    pub fn with_fhss(mut self, fhss: bool) -> Self {
        self.fhss = fhss;
        self
    }

    /// Check the run parameters against the bench before anything is touched
    pub fn validate(&self, chamber: TemperatureBounds) -> Result<(), RunError> {
        check_frequency("Centre frequency", self.center_frequency)?;
        check_frequency("Channel width", self.channel_width)?;
        check_voltage("Nominal voltage", self.nominal_voltage)?;

        if !self.run_obw && !self.run_oob {
            return Err(RunError::configuration(
                "At least one of OBW or OOB measurement must be requested",
            ));
        }

        if let SupplyMode::Ac { frequency_hz } = self.supply {
            if !(frequency_hz > 0.0 && frequency_hz <= MAX_AC_FREQUENCY_HZ) {
                return Err(RunError::configuration(format!(
                    "AC supply frequency {frequency_hz} Hz outside (0, {MAX_AC_FREQUENCY_HZ}] Hz"
                )));
            }
        }

        if let Some(erp) = self.erp_reference_dbm {
            let (low, high) = ERP_REFERENCE_RANGE_DBM;
            if !(low..=high).contains(&erp) {
                return Err(RunError::configuration(format!(
                    "ERP reference {erp} dBm outside [{low}, {high}] dBm"
                )));
            }
        }

        if self.extreme_conditions {
            let temperature = self.temperature_range.ok_or_else(|| {
                RunError::configuration("Extreme testing requires a temperature range")
            })?;
            let voltage = self.voltage_range.ok_or_else(|| {
                RunError::configuration("Extreme testing requires a voltage range")
            })?;

            check_range("Temperature range", temperature)?;
            check_range("Voltage range", voltage)?;
            check_voltage("Minimum voltage", voltage.min)?;
            check_voltage("Maximum voltage", voltage.max)?;

            if !chamber.contains(temperature.min) || !chamber.contains(temperature.max) {
                return Err(RunError::configuration(format!(
                    "Temperature range [{}, {}] °C outside chamber range {}",
                    temperature.min, temperature.max, chamber
                )));
            }
        }

        Ok(())
    }
}

fn check_frequency(name: &str, hz: u64) -> Result<(), RunError> {
    if hz == 0 || hz >= MAX_FREQUENCY_HZ {
        return Err(RunError::configuration(format!(
            "{name} {hz} Hz outside (0, {MAX_FREQUENCY_HZ}) Hz"
        )));
    }
    Ok(())
}

fn check_voltage(name: &str, volts: f64) -> Result<(), RunError> {
    if !(volts > 0.0 && volts <= MAX_VOLTAGE) {
        return Err(RunError::configuration(format!(
            "{name} {volts} V outside (0, {MAX_VOLTAGE}] V"
        )));
    }
    Ok(())
}

fn check_range(name: &str, range: ValueRange) -> Result<(), RunError> {
    if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
        return Err(RunError::configuration(format!(
            "{name} minimum {} exceeds maximum {}",
            range.min, range.max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chamber() -> TemperatureBounds {
        TemperatureBounds::new(-40.0, 180.0)
    }

    fn base() -> TestRunConfig {
        TestRunConfig::new(169_612_500, 12_500, 12.0)
    }

    fn assert_config_error(config: &TestRunConfig, needle: &str) {
        match config.validate(chamber()) {
            Err(RunError::Configuration(msg)) => {
                assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'")
            }
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_nominal_config() {
        assert!(base().validate(chamber()).is_ok());
    }

    #[test]
    fn test_frequency_bounds() {
        let mut config = base();
        config.center_frequency = 0;
        assert_config_error(&config, "Centre frequency");

        config.center_frequency = MAX_FREQUENCY_HZ;
        assert_config_error(&config, "Centre frequency");

        let mut config = base();
        config.channel_width = 0;
        assert_config_error(&config, "Channel width");
    }

    #[test]
    fn test_requires_a_measurement() {
        let config = base().with_measurements(false, false);
        assert_config_error(&config, "OBW or OOB");
        assert!(base().with_measurements(false, true).validate(chamber()).is_ok());
    }

    #[test]
    fn test_extremes_need_ranges() {
        let mut config = base();
        config.extreme_conditions = true;
        assert_config_error(&config, "temperature range");

        config.temperature_range = Some(ValueRange::new(-20.0, 55.0));
        assert_config_error(&config, "voltage range");
    }

    #[test]
    fn test_temperature_range_within_chamber() {
        let config = base().with_extremes(
            ValueRange::new(-50.0, 55.0),
            ValueRange::new(10.8, 13.2),
        );
        assert_config_error(&config, "outside chamber range");

        let config = base().with_extremes(
            ValueRange::new(-20.0, 55.0),
            ValueRange::new(10.8, 13.2),
        );
        assert!(config.validate(chamber()).is_ok());
    }

    #[test]
    fn test_inverted_ranges() {
        let config = base().with_extremes(
            ValueRange::new(55.0, -20.0),
            ValueRange::new(10.8, 13.2),
        );
        assert_config_error(&config, "Temperature range");

        let config = base().with_extremes(
            ValueRange::new(-20.0, 55.0),
            ValueRange::new(13.2, 10.8),
        );
        assert_config_error(&config, "Voltage range");
    }

    #[test]
    fn test_voltage_limits() {
        let mut config = base();
        config.nominal_voltage = 0.0;
        assert_config_error(&config, "Nominal voltage");

        config.nominal_voltage = 300.0;
        assert_config_error(&config, "Nominal voltage");
    }

    #[test]
    fn test_ac_supply_frequency() {
        let config = base().with_supply(SupplyMode::Ac { frequency_hz: 50.0 });
        assert!(config.validate(chamber()).is_ok());

        let config = base().with_supply(SupplyMode::Ac { frequency_hz: 0.0 });
        assert_config_error(&config, "AC supply frequency");
    }

    #[test]
    fn test_erp_reference_range() {
        assert!(base().with_erp_reference(10.0).validate(chamber()).is_ok());
        assert_config_error(&base().with_erp_reference(60.0), "ERP reference");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let yaml = "center_frequency: 868300000\nchannel_width: 25000\nnominal_voltage: 3.6\n";
        let config: TestRunConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.run_obw && config.run_oob);
        assert_eq!(config.supply, SupplyMode::Dc);
        assert!(!config.extreme_conditions);
    }

    #[test]
    fn test_deserialize_ac_supply() {
        let yaml = "center_frequency: 868300000\n\
                    channel_width: 25000\n\
                    nominal_voltage: 230\n\
                    supply:\n  mode: ac\n  frequency_hz: 50\n";
        let config: TestRunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.supply, SupplyMode::Ac { frequency_hz: 50.0 });
    }
}
