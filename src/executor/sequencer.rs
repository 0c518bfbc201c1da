//! Run sequencing
//!
//! Walks one test run through its states:
//!
//! ```text
//! Init -> ApplyNominalVoltage -> [Calibrate] -> { [Stabilize] -> StepExecute }* -> Aggregate -> Done
//! ```
//!
//! `Cleanup` is entered exactly once from wherever the run stops, including
//! failures, cancellation and panics inside the run body. Cleanup problems
//! are logged and never replace the reason the run ended.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn};

use super::{
    build_condition_matrix, gated, summarize, CancellationToken, ErpCalibrator, RunContext,
    StabilizationOutcome, StabilizationPolicy, StabilizationWaiter, StepExecutor,
};
use crate::config::{BenchConfig, CalibrationConfig};
use crate::error::RunError;
use crate::instruments::{InstrumentKind, InstrumentResult, InstrumentSet, ScreenshotNaming};
use crate::models::{
    ConditionLabel, RunOutcome, RunResult, StepResult, SupplyMode, TestRunConfig,
};
use crate::utils::Stopwatch;

/// Orchestrator states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    ApplyNominalVoltage,
    Calibrate,
    Stabilize(ConditionLabel),
    StepExecute(ConditionLabel),
    Aggregate,
    Cleanup,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "Init"),
            RunState::ApplyNominalVoltage => write!(f, "ApplyNominalVoltage"),
            RunState::Calibrate => write!(f, "Calibrate"),
            RunState::Stabilize(label) => write!(f, "Stabilize({label})"),
            RunState::StepExecute(label) => write!(f, "StepExecute({label})"),
            RunState::Aggregate => write!(f, "Aggregate"),
            RunState::Cleanup => write!(f, "Cleanup"),
            RunState::Done => write!(f, "Done"),
        }
    }
}

/// Drives one test run over an exclusively borrowed instrument set
pub struct Sequencer<'a> {
    instruments: &'a mut InstrumentSet,
    ctx: RunContext,
    calibration: CalibrationConfig,
    state: RunState,
    steps: Vec<StepResult>,
    screenshots: Vec<String>,
    erp_offset_db: Option<f64>,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        instruments: &'a mut InstrumentSet,
        bench: &BenchConfig,
        config: TestRunConfig,
        token: CancellationToken,
    ) -> Self {
        let naming = ScreenshotNaming::new(config.project.as_deref(), Utc::now());
        Self {
            instruments,
            ctx: RunContext {
                config,
                timing: bench.timing.clone(),
                token,
                naming,
            },
            calibration: bench.calibration.clone(),
            state: RunState::Init,
            steps: Vec::new(),
            screenshots: Vec::new(),
            erp_offset_db: None,
        }
    }

    /// Run to completion; cleanup has happened by the time this returns
    pub async fn run(mut self) -> RunOutcome {
        let started_at = Utc::now();

        let body = AssertUnwindSafe(self.run_sequence(started_at, Stopwatch::new()))
            .catch_unwind()
            .await;
        let result = match body {
            Ok(result) => result,
            Err(panic) => Err(RunError::Unexpected(format!(
                "panic in {}: {}",
                self.state,
                panic_message(panic.as_ref())
            ))),
        };

        match &result {
            Ok(_) => {}
            Err(RunError::Cancelled) => info!(
                "Run cancelled in {} after {} completed step(s)",
                self.state,
                self.steps.len()
            ),
            Err(e) => error!(
                "Run failed in {} after {} completed step(s): {}",
                self.state,
                self.steps.len(),
                e
            ),
        }

        self.cleanup().await;

        if let Ok(run) = &result {
            self.transition(RunState::Done);
            info!(
                "Run completed in {}ms: {} condition(s), all passed: {}",
                run.duration_ms,
                run.steps.len(),
                run.summary.is_all_passed()
            );
        }
        result.into()
    }

    async fn run_sequence(
        &mut self,
        started_at: DateTime<Utc>,
        mut stopwatch: Stopwatch,
    ) -> Result<RunResult, RunError> {
        self.transition(RunState::Init);
        self.ctx.token.check()?;
        self.ctx
            .config
            .validate(self.instruments.chamber.temperature_bounds())?;
        let matrix = build_condition_matrix(&self.ctx.config);
        info!(
            "Test matrix: {} condition(s) at {} Hz, channel {} Hz",
            matrix.len(),
            self.ctx.config.center_frequency,
            self.ctx.config.channel_width
        );

        self.transition(RunState::ApplyNominalVoltage);
        let mut applied_voltage = self.apply_nominal_voltage().await?;

        if let Some(reference) = self.ctx.config.erp_reference_dbm {
            self.transition(RunState::Calibrate);
            let offset = ErpCalibrator::new(
                self.instruments.analyzer.as_mut(),
                &self.calibration,
                &self.ctx.token,
            )
            .with_sweep_settle(self.ctx.timing.sweep_settle())
            .calibrate(
                self.ctx.config.center_frequency,
                self.ctx.config.channel_width,
                reference,
            )
            .await?;
            self.erp_offset_db = Some(offset);
        }

        let mut applied_temperature: Option<f64> = None;
        for point in &matrix {
            self.ctx.token.check()?;

            if let Some(target) = point.temperature {
                if applied_temperature != Some(target) {
                    self.transition(RunState::Stabilize(point.label));
                    self.stabilize(target).await?;
                    applied_temperature = Some(target);
                }
            }

            self.ctx.token.check()?;
            self.transition(RunState::StepExecute(point.label));
            let step = StepExecutor::new(self.instruments, &self.ctx, &mut self.screenshots)
                .execute(point, &mut applied_voltage)
                .await?;
            stopwatch.lap(point.label.name());
            self.steps.push(step);
        }
        self.ctx.token.check()?;

        self.transition(RunState::Aggregate);
        debug!("Condition timings:\n{}", stopwatch.format());
        let steps = std::mem::take(&mut self.steps);
        let summary = summarize(&steps);
        Ok(RunResult {
            started_at,
            duration_ms: stopwatch.total().as_millis() as u64,
            erp_offset_db: self.erp_offset_db,
            screenshots: std::mem::take(&mut self.screenshots),
            steps,
            summary,
        })
    }

    async fn apply_nominal_voltage(&mut self) -> Result<f64, RunError> {
        let volts = self.ctx.config.nominal_voltage;
        let supply = self.instruments.supply.as_mut();
        let token = &self.ctx.token;

        match self.ctx.config.supply {
            SupplyMode::Dc => {
                info!("Supply on: {} V DC", volts);
                gated(token, InstrumentKind::PowerSupply, supply.set_voltage_dc(volts)).await?;
            }
            SupplyMode::Ac { frequency_hz } => {
                info!("Supply on: {} V AC, {} Hz", volts, frequency_hz);
                gated(
                    token,
                    InstrumentKind::PowerSupply,
                    supply.set_voltage_ac(volts, frequency_hz),
                )
                .await?;
            }
        }

        token.sleep(self.ctx.timing.voltage_settle()).await?;
        Ok(volts)
    }

    async fn stabilize(&mut self, target: f64) -> Result<(), RunError> {
        let policy = StabilizationPolicy::from(&self.ctx.timing);
        let mut waiter =
            StabilizationWaiter::new(self.instruments.chamber.as_mut(), policy, &self.ctx.token);
        let outcome = waiter.wait_for(target).await;
        debug!("Chamber stabilization for {:.1} °C ended {}", target, waiter.state());

        match outcome {
            StabilizationOutcome::Settled {
                reading,
                polls,
                used_grace,
            } => {
                info!(
                    "Chamber settled at {:.1} °C after {} poll(s){}",
                    reading,
                    polls,
                    if used_grace { " (grace window)" } else { "" }
                );
                Ok(())
            }
            StabilizationOutcome::TimedOut { reading } => {
                Err(RunError::StabilizationTimeout { target, reading })
            }
            StabilizationOutcome::Cancelled => Err(RunError::Cancelled),
            StabilizationOutcome::ChamberError(source) => {
                Err(RunError::instrument(InstrumentKind::ClimateChamber, source))
            }
        }
    }

    /// Power down and reset everything. Runs regardless of cancellation.
    async fn cleanup(&mut self) {
        self.transition(RunState::Cleanup);

        attempt("supply amp off", self.instruments.supply.amp_off()).await;
        attempt("analyzer reset", self.instruments.analyzer.reset()).await;
        attempt("supply reset", self.instruments.supply.reset()).await;

        match attempt("chamber status", self.instruments.chamber.is_running()).await {
            Some(false) => debug!("Cleanup: chamber not running"),
            // Unknown status is treated as running
            Some(true) | None => {
                attempt("chamber stop", self.instruments.chamber.stop()).await;
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state: {} -> {}", self.state, next);
        self.state = next;
    }
}

/// One cleanup action; failures and panics are logged and swallowed
async fn attempt<T, F>(what: &str, action: F) -> Option<T>
where
    F: Future<Output = InstrumentResult<T>>,
{
    match AssertUnwindSafe(action).catch_unwind().await {
        Ok(Ok(value)) => {
            debug!("Cleanup: {} done", what);
            Some(value)
        }
        Ok(Err(e)) => {
            warn!("Cleanup: {} failed: {}", what, e);
            None
        }
        Err(panic) => {
            warn!("Cleanup: {} panicked: {}", what, panic_message(panic.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
