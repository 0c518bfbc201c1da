//! rf-bench - RF compliance test-matrix runner
//!
//! Drives a spectrum analyzer, a programmable power supply and a climate
//! chamber through the EN 300 220-1 occupied bandwidth and out-of-band
//! emission measurements, at the normal condition and optionally at the
//! four extreme temperature/voltage combinations.
//!
//! ## Usage
//!
//! ```bash
//! # Rehearse a normal-condition run against simulated instruments
//! rf-bench run --simulate -f 169.6125MHz -w 12.5kHz --voltage 12
//!
//! # Full matrix with ERP calibration, JSON output
//! rf-bench run --simulate -f 868.3MHz -w 25kHz --voltage 3.3 --erp 10 \
//!     --extreme --temp-min -20 --temp-max 55 --volt-min 3.0 --volt-max 3.6 \
//!     --format json-pretty
//!
//! # Analyzer settings and limit masks for a channel
//! rf-bench params 169.6125MHz 12.5kHz --band
//!
//! # Operational band lookup
//! rf-bench band 868.3MHz --fhss
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

mod cli;
mod config;
mod error;
mod executor;
mod instruments;
mod models;
mod output;
mod standard;
mod utils;

use cli::Args;
use config::{BandTableConfig, BenchConfig, EnvConfig, TimingConfig};
use executor::TestBench;
use instruments::sim::SimHarness;
use instruments::{BandTable, DirectorySink, FrequencyBandLookup};
use models::{RunOutcome, SupplyMode, TestRunConfig, ValueRange};
use output::{write_result_to_file, OutputFormat, ResultFormatter};
use utils::{format_frequency, init_logger, LogLevel};

/// Exit code when the run failed before producing a result
const EXIT_FAILED: i32 = 1;
/// Exit code when the run completed but a limit check failed
const EXIT_LIMIT_FAIL: i32 = 2;
/// Exit code when the run was interrupted
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    let verbose = args.verbose || env.verbose.unwrap_or(false);
    init_logger(if verbose { LogLevel::Debug } else { LogLevel::Info });

    match args.command {
        cli::Command::Run(run_args) => {
            let code = run_matrix(run_args, args.config.as_deref(), &env).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        cli::Command::Params(params_args) => {
            let config = load_bench_config(args.config.as_deref(), &env)?;
            show_params(params_args, &config.bands)?;
        }
        cli::Command::Band(band_args) => {
            let config = load_bench_config(args.config.as_deref(), &env)?;
            lookup_band(band_args, &config.bands)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, args.config.as_deref(), &env)?;
        }
    }

    Ok(())
}

/// Bench configuration from `--config`, `RF_BENCH_CONFIG` or the default
/// locations, without environment overrides
fn read_bench_config(path: Option<&str>, env: &EnvConfig) -> Result<BenchConfig> {
    match path.or(env.config_file.as_deref()) {
        Some(path) => BenchConfig::load(path),
        None => BenchConfig::load_default(),
    }
}

fn load_bench_config(path: Option<&str>, env: &EnvConfig) -> Result<BenchConfig> {
    let mut config = read_bench_config(path, env)?;
    env.apply(&mut config);
    config
        .validate()
        .context("Invalid configuration after RF_BENCH_* overrides")?;
    Ok(config)
}

fn band_table(config: &BandTableConfig) -> Result<BandTable> {
    match &config.path {
        Some(path) => BandTable::load(path, config.fhss_path.as_deref()),
        None => Ok(BandTable::builtin()),
    }
}

fn run_config(args: &cli::RunArgs) -> Result<TestRunConfig> {
    if let Some(path) = &args.run_file {
        return config::load_run_file(path)
            .with_context(|| format!("Failed to load run file: {path}"));
    }

    let (Some(frequency), Some(channel_width), Some(voltage)) =
        (args.frequency, args.channel_width, args.voltage)
    else {
        bail!("--frequency, --channel-width and --voltage are required without --run-file");
    };

    let mut config = TestRunConfig::new(frequency, channel_width, voltage)
        .with_measurements(!args.no_obw, !args.no_oob)
        .with_dm2(args.dm2)
        .with_fhss(args.fhss);

    if let Some(project) = &args.project {
        config = config.with_project(project);
    }
    if let Some(frequency_hz) = args.ac_frequency {
        config = config.with_supply(SupplyMode::Ac { frequency_hz });
    }
    if let Some(erp) = args.erp {
        config = config.with_erp_reference(erp);
    }
    if args.extreme {
        let (Some(t_min), Some(t_max), Some(v_min), Some(v_max)) =
            (args.temp_min, args.temp_max, args.volt_min, args.volt_max)
        else {
            bail!("--extreme needs --temp-min, --temp-max, --volt-min and --volt-max");
        };
        config = config.with_extremes(
            ValueRange::new(t_min, t_max),
            ValueRange::new(v_min, v_max),
        );
    }

    Ok(config)
}

async fn run_matrix(
    args: cli::RunArgs,
    config_path: Option<&str>,
    env: &EnvConfig,
) -> Result<i32> {
    let format_name = env.format.clone().unwrap_or_else(|| args.format.clone());
    let format = OutputFormat::from_str(&format_name)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {format_name}"))?;
    let mut formatter = ResultFormatter::new(format);
    if args.no_color {
        formatter = formatter.no_color();
    }

    let run = run_config(&args)?;

    if !args.simulate {
        bail!(
            "No instrument drivers are configured on this build; \
             use --simulate to rehearse the run"
        );
    }

    let mut bench_config =
        read_bench_config(config_path, env)?.with_timing(TimingConfig::simulation());
    env.apply(&mut bench_config);
    bench_config
        .validate()
        .context("Invalid configuration after RF_BENCH_* overrides")?;

    let harness = SimHarness::new();
    for operation in &args.faults {
        info!("Injecting simulated fault: {}", operation);
        harness.fail_on(operation);
    }

    let mut instruments = harness.instrument_set();
    instruments.bands = Arc::new(band_table(&bench_config.bands)?);
    if let Some(dir) = &bench_config.screenshots.dir {
        let sink = DirectorySink::new(dir)?;
        info!("Storing screenshots in {}", sink.dir().display());
        instruments = instruments.with_screenshots(Arc::new(sink));
    }

    info!(
        "Testing {} / {} at {} V ({} condition(s))",
        format_frequency(run.center_frequency as f64),
        format_frequency(run.channel_width as f64),
        run.nominal_voltage,
        if run.extreme_conditions { 5 } else { 1 }
    );

    let bench = TestBench::new(instruments, bench_config);
    let timing = &bench.config().timing;
    info!(
        "Chamber budget {}s + {}s grace, polling every {}s",
        timing.primary_budget_secs, timing.grace_window_secs, timing.poll_interval_secs
    );
    let handle = bench.start_run(run)?;
    let token = handle.cancellation_token();

    let wait = handle.wait();
    tokio::pin!(wait);
    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, cancelling run and powering down instruments");
            token.cancel();
            wait.await
        }
    };

    println!("{}", formatter.format_outcome(&outcome));

    let code = match &outcome {
        RunOutcome::Completed(result) => {
            if let Some(path) = &args.output {
                write_result_to_file(path, result, format)?;
                info!("Result written to {}", path);
            }
            if result.summary.is_all_passed() {
                0
            } else {
                EXIT_LIMIT_FAIL
            }
        }
        RunOutcome::Cancelled => EXIT_CANCELLED,
        RunOutcome::Failed(err) => {
            warn!("Run failed ({}): {}", err.kind(), err);
            EXIT_FAILED
        }
    };

    Ok(code)
}

fn show_params(args: cli::ParamsArgs, bands: &BandTableConfig) -> Result<()> {
    let obw = standard::occupied_bandwidth_parameters(args.channel_width);
    let oob = standard::out_of_band_parameters(args.channel_width);

    println!(
        "Channel {} / {}",
        format_frequency(args.frequency as f64),
        format_frequency(args.channel_width as f64)
    );
    println!("{:-<60}", "");
    println!("Occupied bandwidth:");
    println!("  RBW:      {}", format_frequency(obw.resolution_bandwidth));
    println!(
        "  VBW:      {}",
        format_frequency(obw.resolution_bandwidth * obw.video_bandwidth_ratio as f64)
    );
    println!("  Span:     {}", format_frequency(obw.span as f64));
    println!("  Detector: {}", obw.detector);
    println!();
    println!("Out-of-band emissions:");
    println!("  RBW:      {}", format_frequency(oob.resolution_bandwidth));
    println!("  Span:     {}", format_frequency(oob.span as f64));
    println!("  Detector: {}", oob.detector);
    println!();
    println!("Operating channel mask:");
    for point in standard::operating_channel_mask(args.frequency, args.channel_width) {
        println!("  {:>12} Hz  {:>6.1} dBm", point.frequency, point.level_dbm);
    }

    if args.band {
        let table = band_table(bands)?;
        let band = table
            .band_for(args.frequency, args.fhss)
            .with_context(|| format!("No operational band contains {} Hz", args.frequency))?;
        let view = standard::operational_band_view(band.lower_edge, band.upper_edge);

        println!();
        println!(
            "Operational band mask ({}, view {} / {}):",
            band.name,
            format_frequency(view.center as f64),
            format_frequency(view.span as f64)
        );
        for point in standard::operational_band_mask(band.lower_edge, band.upper_edge) {
            println!("  {:>12} Hz  {:>6.1} dBm", point.frequency, point.level_dbm);
        }
    }

    Ok(())
}

fn lookup_band(args: cli::BandArgs, bands: &BandTableConfig) -> Result<()> {
    let table = match &args.bands {
        Some(path) => BandTable::load(path, bands.fhss_path.as_deref())?,
        None => band_table(bands)?,
    };

    if args.list {
        let list = if args.fhss {
            table.fhss_bands()
        } else {
            table.bands()
        };
        println!("{} band(s):", list.len());
        for band in list {
            println!(
                "  {:24} {:>12} - {:>12} Hz",
                band.name, band.lower_edge, band.upper_edge
            );
        }
        println!();
    }

    match table.band_for(args.frequency, args.fhss) {
        Some(band) => {
            println!(
                "✓ {} is in {} ({} - {} Hz)",
                format_frequency(args.frequency as f64),
                band.name,
                band.lower_edge,
                band.upper_edge
            );
            Ok(())
        }
        None => bail!(
            "No {}operational band contains {}",
            if args.fhss { "FHSS " } else { "" },
            format_frequency(args.frequency as f64)
        ),
    }
}

fn manage_config(args: cli::ConfigArgs, path: Option<&str>, env: &EnvConfig) -> Result<()> {
    if args.env {
        env.print_summary();
        println!();
        config::print_env_help();
        return Ok(());
    }

    let source = path
        .map(str::to_string)
        .or_else(|| env.config_file.clone())
        .or_else(|| BenchConfig::find().map(|p| p.to_string_lossy().to_string()));

    if args.validate {
        let Some(source) = source else {
            bail!(
                "No configuration file found (searched: {})",
                config::CONFIG_LOCATIONS.join(", ")
            );
        };
        return match BenchConfig::load(Path::new(&source)) {
            Ok(_) => {
                println!("✓ Configuration file is valid: {source}");
                Ok(())
            }
            Err(e) => {
                println!("✗ Configuration file is invalid: {source}");
                println!("  Error: {e:#}");
                Err(e)
            }
        };
    }

    let config = load_bench_config(path, env)?;
    match &source {
        Some(source) => info!("Configuration loaded from {}", source),
        None => info!("No configuration file found, using defaults"),
    }
    if env.has_any() {
        info!("Environment overrides applied");
    }

    let output = if args.format == "json" {
        serde_json::to_string_pretty(&config)?
    } else {
        serde_yaml::to_string(&config)?
    };
    println!("{output}");

    Ok(())
}
