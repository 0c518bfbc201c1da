//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

use crate::utils::parse_frequency;

/// RF compliance test-matrix runner
#[derive(Parser, Debug)]
#[command(name = "rf-bench")]
#[command(version)]
#[command(about = "Run EN 300 220-1 bandwidth and out-of-band measurements across climate conditions")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Bench configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test matrix
    Run(RunArgs),

    /// Print analyzer parameters and limit masks for a channel
    Params(ParamsArgs),

    /// Look up the operational band for a frequency
    Band(BandArgs),

    /// Show effective configuration
    Config(ConfigArgs),
}

/// Parse a frequency argument with an optional unit suffix
fn frequency_arg(s: &str) -> Result<u64, String> {
    parse_frequency(s).map_err(|e| e.to_string())
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Use simulated instruments
    #[arg(long)]
    pub simulate: bool,

    /// Make a simulated operation fail, e.g. `chamber.current_temperature` (repeatable)
    #[arg(long = "fault", requires = "simulate")]
    pub faults: Vec<String>,

    /// Read run parameters from a YAML or JSON file
    #[arg(long, conflicts_with_all = ["frequency", "channel_width", "voltage"])]
    pub run_file: Option<String>,

    /// Centre frequency (e.g. 169.6125MHz)
    #[arg(short, long, value_parser = frequency_arg, required_unless_present = "run_file")]
    pub frequency: Option<u64>,

    /// Channel width (e.g. 12.5kHz)
    #[arg(short = 'w', long, value_parser = frequency_arg, required_unless_present = "run_file")]
    pub channel_width: Option<u64>,

    /// Nominal supply voltage, V
    #[arg(long, required_unless_present = "run_file")]
    pub voltage: Option<f64>,

    /// Drive the supply in AC mode at this frequency, Hz
    #[arg(long)]
    pub ac_frequency: Option<f64>,

    /// Calibrate the reference level against this conducted ERP, dBm
    #[arg(long, allow_hyphen_values = true)]
    pub erp: Option<f64>,

    /// Run the four extreme temperature/voltage conditions
    #[arg(
        short,
        long,
        requires = "temp_min",
        requires = "temp_max",
        requires = "volt_min",
        requires = "volt_max"
    )]
    pub extreme: bool,

    /// Minimum extreme temperature, °C
    #[arg(long, allow_hyphen_values = true)]
    pub temp_min: Option<f64>,

    /// Maximum extreme temperature, °C
    #[arg(long, allow_hyphen_values = true)]
    pub temp_max: Option<f64>,

    /// Minimum extreme voltage, V
    #[arg(long)]
    pub volt_min: Option<f64>,

    /// Maximum extreme voltage, V
    #[arg(long)]
    pub volt_max: Option<f64>,

    /// Skip the occupied bandwidth measurement
    #[arg(long)]
    pub no_obw: bool,

    /// Skip the out-of-band emissions measurement
    #[arg(long)]
    pub no_oob: bool,

    /// Test signal is DM2 (average trace instead of max hold)
    #[arg(long)]
    pub dm2: bool,

    /// Device uses frequency hopping; look up FHSS bands
    #[arg(long)]
    pub fhss: bool,

    /// Project name used for screenshot names
    #[arg(short, long)]
    pub project: Option<String>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(long, default_value = "table")]
    pub format: String,

    /// Also write the result to this file
    #[arg(short, long)]
    pub output: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Arguments for params command
#[derive(Parser, Debug)]
pub struct ParamsArgs {
    /// Centre frequency (e.g. 169.6125MHz)
    #[arg(value_parser = frequency_arg)]
    pub frequency: u64,

    /// Channel width (e.g. 12.5kHz)
    #[arg(value_parser = frequency_arg)]
    pub channel_width: u64,

    /// Also print the operational band mask
    #[arg(long)]
    pub band: bool,

    /// Use the FHSS band table for the band mask
    #[arg(long)]
    pub fhss: bool,
}

/// Arguments for band command
#[derive(Parser, Debug)]
pub struct BandArgs {
    /// Frequency to look up (e.g. 868.3MHz)
    #[arg(value_parser = frequency_arg)]
    pub frequency: u64,

    /// Use the FHSS band table
    #[arg(long)]
    pub fhss: bool,

    /// Band table CSV (overrides configuration)
    #[arg(long)]
    pub bands: Option<String>,

    /// List every band in the table
    #[arg(short, long)]
    pub list: bool,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show environment variable overrides
    #[arg(long)]
    pub env: bool,

    /// Output format (yaml, json)
    #[arg(short, long, default_value = "yaml")]
    pub format: String,

    /// Validate the configuration file and exit
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_with_units() {
        let args = Args::parse_from([
            "rf-bench",
            "run",
            "--simulate",
            "--frequency",
            "169.6125MHz",
            "--channel-width",
            "12.5kHz",
            "--voltage",
            "12",
        ]);
        match args.command {
            Command::Run(run) => {
                assert!(run.simulate);
                assert_eq!(run.frequency, Some(169_612_500));
                assert_eq!(run.channel_width, Some(12_500));
                assert_eq!(run.voltage, Some(12.0));
                assert!(!run.extreme);
                assert_eq!(run.format, "table");
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_extreme_requires_ranges() {
        let base = "rf-bench run -f 868.3MHz -w 25k --voltage 3.3 --extreme";
        let result = Args::try_parse_from(format!("{base} --temp-min -20").split_whitespace());
        assert!(result.is_err());

        let ranges = "--temp-min -20 --temp-max 55 --volt-min 3.0 --volt-max 3.6";
        let args = Args::parse_from(format!("{base} {ranges} --erp -3.5").split_whitespace());
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.temp_min, Some(-20.0));
                assert_eq!(run.erp, Some(-3.5));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_file_replaces_channel_flags() {
        let args = Args::parse_from(["rf-bench", "run", "--run-file", "run.yaml", "--simulate"]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.run_file.as_deref(), Some("run.yaml"));
                assert!(run.frequency.is_none());
            }
            _ => panic!("Expected Run command"),
        }

        let result = Args::try_parse_from(["rf-bench", "run", "--simulate"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fault_requires_simulate() {
        let result = Args::try_parse_from(
            "rf-bench run --run-file run.yaml --fault supply.amp_off".split_whitespace(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_frequency() {
        let result = Args::try_parse_from(["rf-bench", "band", "12.5parsecs"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_params_args() {
        let args =
            Args::parse_from("rf-bench -v params 169.6125MHz 12.5kHz --band".split_whitespace());
        assert!(args.verbose);
        match args.command {
            Command::Params(params) => {
                assert_eq!(params.frequency, 169_612_500);
                assert_eq!(params.channel_width, 12_500);
                assert!(params.band);
            }
            _ => panic!("Expected Params command"),
        }
    }
}
