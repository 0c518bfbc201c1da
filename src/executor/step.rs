//! Measurement step execution
//!
//! Runs the requested measurements at one condition point. Every analyzer
//! and supply command goes through [`gated`], so a cancellation request stops
//! the step before the next command is sent.

use tracing::{debug, info, warn};

use super::{gated, CancellationToken};
use crate::config::TimingConfig;
use crate::error::RunError;
use crate::instruments::{InstrumentKind, InstrumentSet, ScreenshotNaming, TraceMode};
use crate::models::{ConditionPoint, StepResult, TestRunConfig};
use crate::standard::{
    occupied_bandwidth_parameters, operating_channel_mask, operational_band_mask,
    operational_band_view, out_of_band_parameters,
};
use crate::utils::{format_frequency, Timer};

const ANALYZER: InstrumentKind = InstrumentKind::SpectrumAnalyzer;
const SUPPLY: InstrumentKind = InstrumentKind::PowerSupply;

/// Read-only inputs shared by every step of a run
#[derive(Clone, Debug)]
pub struct RunContext {
    pub config: TestRunConfig,
    pub timing: TimingConfig,
    pub token: CancellationToken,
    pub naming: ScreenshotNaming,
}

/// Executes measurement steps against the instrument set
pub struct StepExecutor<'a> {
    instruments: &'a mut InstrumentSet,
    ctx: &'a RunContext,
    screenshots: &'a mut Vec<String>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        instruments: &'a mut InstrumentSet,
        ctx: &'a RunContext,
        screenshots: &'a mut Vec<String>,
    ) -> Self {
        Self {
            instruments,
            ctx,
            screenshots,
        }
    }

    /// Bring the supply to the point's voltage and run the requested measurements.
    ///
    /// `applied_voltage` tracks the supply output across steps; the supply is
    /// only touched when the voltage differs.
    pub async fn execute(
        &mut self,
        point: &ConditionPoint,
        applied_voltage: &mut f64,
    ) -> Result<StepResult, RunError> {
        let timer = Timer::start(format!("Step {}", point.label));
        let mut result = StepResult::new(*point);

        if point.voltage != *applied_voltage {
            info!("Changing supply voltage {} V -> {} V", applied_voltage, point.voltage);
            gated(
                &self.ctx.token,
                SUPPLY,
                self.instruments.supply.change_voltage(point.voltage),
            )
            .await?;
            *applied_voltage = point.voltage;
            self.ctx.token.sleep(self.ctx.timing.voltage_settle()).await?;
        }

        if self.ctx.config.run_obw {
            result.occupied_bandwidth = Some(self.occupied_bandwidth(point).await?);
        }

        if self.ctx.config.run_oob {
            let (operating_channel, operational_band) = self.out_of_band(point).await?;
            result.operating_channel_pass = Some(operating_channel);
            result.operational_band_pass = Some(operational_band);
        }

        result.duration_ms = timer.stop().as_millis() as u64;
        info!("  {}", result);
        Ok(result)
    }

    async fn occupied_bandwidth(&mut self, point: &ConditionPoint) -> Result<f64, RunError> {
        let ctx = self.ctx;
        let config = &ctx.config;
        let token = &ctx.token;
        let params = occupied_bandwidth_parameters(config.channel_width);
        let trace = self.primary_trace_mode();
        debug!("OBW parameters: {:?}", params);

        let analyzer = self.instruments.analyzer.as_mut();
        gated(token, ANALYZER, analyzer.set_center_frequency(config.center_frequency)).await?;
        gated(token, ANALYZER, analyzer.set_span(params.span)).await?;
        gated(
            token,
            ANALYZER,
            analyzer.set_resolution_bandwidth(params.resolution_bandwidth),
        )
        .await?;
        gated(
            token,
            ANALYZER,
            analyzer.set_video_bandwidth_ratio(params.video_bandwidth_ratio),
        )
        .await?;
        gated(token, ANALYZER, analyzer.set_trace_mode(1, trace)).await?;
        gated(token, ANALYZER, analyzer.set_trace_mode(2, TraceMode::ClearWrite)).await?;
        gated(token, ANALYZER, analyzer.set_detector(params.detector)).await?;

        token.sleep(ctx.timing.sweep_settle()).await?;
        let bandwidth = gated(
            token,
            ANALYZER,
            self.instruments.analyzer.measure_occupied_bandwidth(),
        )
        .await?;
        info!("Occupied bandwidth at {}: {}", point.label, format_frequency(bandwidth));

        self.capture(point, "OBW").await?;
        Ok(bandwidth)
    }

    /// Returns (operating channel pass, operational band pass)
    async fn out_of_band(&mut self, point: &ConditionPoint) -> Result<(bool, bool), RunError> {
        let ctx = self.ctx;
        let config = &ctx.config;
        let token = &ctx.token;
        let trace = self.primary_trace_mode();

        let band = self
            .instruments
            .bands
            .band_for(config.center_frequency, config.fhss)
            .ok_or(RunError::BandNotFound {
                center_frequency: config.center_frequency,
                fhss: config.fhss,
            })?;
        debug!(
            "Operational band {}: {} - {}",
            band.name,
            format_frequency(band.lower_edge as f64),
            format_frequency(band.upper_edge as f64)
        );

        let params = out_of_band_parameters(config.channel_width);
        let channel_mask = operating_channel_mask(config.center_frequency, config.channel_width);

        let analyzer = self.instruments.analyzer.as_mut();
        gated(token, ANALYZER, analyzer.set_center_frequency(config.center_frequency)).await?;
        gated(token, ANALYZER, analyzer.set_span(params.span)).await?;
        gated(
            token,
            ANALYZER,
            analyzer.set_resolution_bandwidth(params.resolution_bandwidth),
        )
        .await?;
        gated(token, ANALYZER, analyzer.set_trace_mode(1, trace)).await?;
        gated(token, ANALYZER, analyzer.set_detector(params.detector)).await?;
        gated(token, ANALYZER, analyzer.apply_limit_line(&channel_mask)).await?;

        token.sleep(ctx.timing.sweep_settle()).await?;
        let operating_channel = gated(
            token,
            ANALYZER,
            self.instruments.analyzer.check_limit_line(),
        )
        .await?;
        info!(
            "Operating channel limit at {}: {}",
            point.label,
            pass_fail(operating_channel)
        );
        self.capture(point, "OOB-OperatingChannel").await?;

        let view = operational_band_view(band.lower_edge, band.upper_edge);
        let band_mask = operational_band_mask(band.lower_edge, band.upper_edge);

        let analyzer = self.instruments.analyzer.as_mut();
        gated(token, ANALYZER, analyzer.set_center_frequency(view.center)).await?;
        gated(token, ANALYZER, analyzer.set_span(view.span)).await?;
        gated(token, ANALYZER, analyzer.apply_limit_line(&band_mask)).await?;

        token.sleep(ctx.timing.sweep_settle()).await?;
        let operational_band = gated(
            token,
            ANALYZER,
            self.instruments.analyzer.check_limit_line(),
        )
        .await?;
        info!(
            "Operational band limit at {}: {}",
            point.label,
            pass_fail(operational_band)
        );
        self.capture(point, "OOB-OperationalBand").await?;

        Ok((operating_channel, operational_band))
    }

    /// D-M2 test signals are averaged, everything else is max-held
    fn primary_trace_mode(&self) -> TraceMode {
        if self.ctx.config.dm2_signal {
            TraceMode::Average
        } else {
            TraceMode::MaxHold
        }
    }

    /// Take a screenshot if a sink is configured. Storage failures are not fatal.
    async fn capture(&mut self, point: &ConditionPoint, measurement: &str) -> Result<(), RunError> {
        let Some(sink) = self.instruments.screenshots.clone() else {
            return Ok(());
        };

        let name = self.ctx.naming.file_name(point.label.name(), measurement);
        let handle = gated(
            &self.ctx.token,
            ANALYZER,
            self.instruments.analyzer.screenshot(&name),
        )
        .await?;

        // File writes stay off the runtime worker
        match tokio::task::spawn_blocking(move || sink.store(&handle)).await {
            Ok(Ok(location)) => self.screenshots.push(location),
            Ok(Err(e)) => warn!("Failed to store screenshot {}: {:#}", name, e),
            Err(e) => warn!("Screenshot storage task for {} failed: {}", name, e),
        }
        Ok(())
    }
}

fn pass_fail(pass: bool) -> &'static str {
    if pass {
        "PASS"
    } else {
        "FAIL"
    }
}
