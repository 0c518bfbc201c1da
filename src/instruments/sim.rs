//! Simulated instruments
//!
//! Back the `run --simulate` rehearsal mode and the test-suite. Every call is
//! recorded in a shared log as `<instrument>.<operation>`, and any operation
//! can be made to fail (or panic) to rehearse the failure paths.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

use super::{
    BandTable, ClimateChamber, InstrumentError, InstrumentResult, InstrumentSet, PowerSupply,
    ScreenshotHandle, SpectrumAnalyzer, TemperatureBounds, TraceMode,
};
use crate::standard::{Detector, LimitPoint};

const AMBIENT_CELSIUS: f64 = 23.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Fault {
    Error,
    Panic,
}

#[derive(Debug, Default)]
struct SimShared {
    calls: Mutex<Vec<String>>,
    faults: Mutex<HashMap<String, Fault>>,
    supply_output: AtomicBool,
    chamber_running: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared call log and fault plan for a simulated bench
#[derive(Clone, Debug, Default)]
pub struct SimHarness {
    shared: Arc<SimShared>,
}

impl SimHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `operation` fail with a connection error
    pub fn fail_on(&self, operation: &str) -> &Self {
        lock(&self.shared.faults).insert(operation.to_string(), Fault::Error);
        self
    }

    /// Make every call of `operation` panic
    pub fn panic_on(&self, operation: &str) -> &Self {
        lock(&self.shared.faults).insert(operation.to_string(), Fault::Panic);
        self
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.shared.calls).clone()
    }

    /// Number of recorded calls of `operation`
    pub fn count(&self, operation: &str) -> usize {
        lock(&self.shared.calls)
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Index of the first recorded call of `operation`
    pub fn first(&self, operation: &str) -> Option<usize> {
        lock(&self.shared.calls).iter().position(|c| c == operation)
    }

    /// Number of recorded calls on one instrument (`analyzer`, `supply`, `chamber`)
    pub fn count_prefix(&self, instrument: &str) -> usize {
        let prefix = format!("{instrument}.");
        lock(&self.shared.calls)
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    pub fn supply_output_on(&self) -> bool {
        self.shared.supply_output.load(Ordering::SeqCst)
    }

    pub fn chamber_running(&self) -> bool {
        self.shared.chamber_running.load(Ordering::SeqCst)
    }

    /// A complete simulated bench sharing this harness.
    ///
    /// The chamber ramps at 60 °C/min so extreme conditions settle quickly.
    pub fn instrument_set(&self) -> InstrumentSet {
        InstrumentSet::new(
            SimAnalyzer::new(self),
            SimSupply::new(self),
            SimChamber::new(self).ramp_rate(60.0),
            Arc::new(BandTable::builtin()),
        )
    }

    fn record(&self, operation: &str) -> InstrumentResult<()> {
        lock(&self.shared.calls).push(operation.to_string());
        let fault = lock(&self.shared.faults).get(operation).copied();
        match fault {
            Some(Fault::Error) => Err(InstrumentError::Connection(format!(
                "simulated fault in {operation}"
            ))),
            Some(Fault::Panic) => panic!("simulated panic in {operation}"),
            None => Ok(()),
        }
    }
}

/// Simulated spectrum analyzer
pub struct SimAnalyzer {
    harness: SimHarness,
    span: u64,
    occupied_bandwidth: Option<f64>,
    limit_results: VecDeque<bool>,
    limit_default: bool,
    peak_level_dbm: f64,
    reference_offset_db: f64,
    rng: StdRng,
}

impl SimAnalyzer {
    pub fn new(harness: &SimHarness) -> Self {
        Self {
            harness: harness.clone(),
            span: 0,
            occupied_bandwidth: None,
            limit_results: VecDeque::new(),
            limit_default: true,
            peak_level_dbm: 8.0,
            reference_offset_db: 0.0,
            rng: StdRng::seed_from_u64(0x0b5e_55ed),
        }
    }

    /// Report a fixed occupied bandwidth instead of one derived from the span
    pub fn occupied_bandwidth(mut self, hz: f64) -> Self {
        self.occupied_bandwidth = Some(hz);
        self
    }

    /// Result of every limit check not covered by `limit_results`
    pub fn limit_check(mut self, pass: bool) -> Self {
        self.limit_default = pass;
        self
    }

    /// Results of the next limit checks, in order
    pub fn limit_results(mut self, results: impl IntoIterator<Item = bool>) -> Self {
        self.limit_results = results.into_iter().collect();
        self
    }

    /// Peak level before any reference offset is applied
    pub fn peak_level(mut self, dbm: f64) -> Self {
        self.peak_level_dbm = dbm;
        self
    }
}

#[async_trait]
impl SpectrumAnalyzer for SimAnalyzer {
    async fn set_center_frequency(&mut self, hz: u64) -> InstrumentResult<()> {
        self.harness.record("analyzer.set_center_frequency")?;
        debug!("sim analyzer: centre {} Hz", hz);
        Ok(())
    }

    async fn set_span(&mut self, hz: u64) -> InstrumentResult<()> {
        self.harness.record("analyzer.set_span")?;
        self.span = hz;
        Ok(())
    }

    async fn set_resolution_bandwidth(&mut self, _hz: f64) -> InstrumentResult<()> {
        self.harness.record("analyzer.set_resolution_bandwidth")
    }

    async fn set_video_bandwidth_ratio(&mut self, _ratio: u32) -> InstrumentResult<()> {
        self.harness.record("analyzer.set_video_bandwidth_ratio")
    }

    async fn set_detector(&mut self, _detector: Detector) -> InstrumentResult<()> {
        self.harness.record("analyzer.set_detector")
    }

    async fn set_trace_mode(&mut self, _trace: u8, _mode: TraceMode) -> InstrumentResult<()> {
        self.harness.record("analyzer.set_trace_mode")
    }

    async fn measure_occupied_bandwidth(&mut self) -> InstrumentResult<f64> {
        self.harness.record("analyzer.measure_occupied_bandwidth")?;
        if let Some(hz) = self.occupied_bandwidth {
            return Ok(hz);
        }
        // Span is three channel widths; a clean carrier occupies ~80% of one.
        let jitter: f64 = self.rng.random_range(-0.01..0.01);
        Ok((self.span as f64 / 3.0 * 0.8 * (1.0 + jitter)).round())
    }

    async fn apply_limit_line(&mut self, points: &[LimitPoint]) -> InstrumentResult<()> {
        self.harness.record("analyzer.apply_limit_line")?;
        debug!("sim analyzer: limit line with {} points", points.len());
        Ok(())
    }

    async fn check_limit_line(&mut self) -> InstrumentResult<bool> {
        self.harness.record("analyzer.check_limit_line")?;
        Ok(self.limit_results.pop_front().unwrap_or(self.limit_default))
    }

    async fn set_reference_level_offset(&mut self, db: f64) -> InstrumentResult<()> {
        self.harness.record("analyzer.set_reference_level_offset")?;
        self.reference_offset_db = db;
        Ok(())
    }

    async fn peak_marker_level(&mut self) -> InstrumentResult<f64> {
        self.harness.record("analyzer.peak_marker_level")?;
        Ok(self.peak_level_dbm + self.reference_offset_db)
    }

    async fn reset(&mut self) -> InstrumentResult<()> {
        self.harness.record("analyzer.reset")?;
        self.span = 0;
        self.reference_offset_db = 0.0;
        Ok(())
    }

    async fn screenshot(&mut self, name: &str) -> InstrumentResult<ScreenshotHandle> {
        self.harness.record("analyzer.screenshot")?;
        let mut data = vec![0xff, 0xd8, 0xff, 0xe0];
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&[0xff, 0xd9]);
        Ok(ScreenshotHandle {
            name: name.to_string(),
            data,
        })
    }
}

/// Simulated power supply
pub struct SimSupply {
    harness: SimHarness,
    voltage: f64,
}

impl SimSupply {
    pub fn new(harness: &SimHarness) -> Self {
        Self {
            harness: harness.clone(),
            voltage: 0.0,
        }
    }

    fn set_output(&self, on: bool) {
        self.harness.shared.supply_output.store(on, Ordering::SeqCst);
    }
}

#[async_trait]
impl PowerSupply for SimSupply {
    async fn set_voltage_dc(&mut self, volts: f64) -> InstrumentResult<()> {
        self.harness.record("supply.set_voltage_dc")?;
        self.voltage = volts;
        self.set_output(true);
        Ok(())
    }

    async fn set_voltage_ac(&mut self, volts: f64, _frequency_hz: f64) -> InstrumentResult<()> {
        self.harness.record("supply.set_voltage_ac")?;
        self.voltage = volts;
        self.set_output(true);
        Ok(())
    }

    async fn change_voltage(&mut self, volts: f64) -> InstrumentResult<()> {
        self.harness.record("supply.change_voltage")?;
        debug!("sim supply: {} V -> {} V", self.voltage, volts);
        self.voltage = volts;
        Ok(())
    }

    async fn amp_off(&mut self) -> InstrumentResult<()> {
        self.harness.record("supply.amp_off")?;
        self.voltage = 0.0;
        self.set_output(false);
        Ok(())
    }

    async fn reset(&mut self) -> InstrumentResult<()> {
        self.harness.record("supply.reset")?;
        self.voltage = 0.0;
        self.set_output(false);
        Ok(())
    }
}

enum Readings {
    /// First-order ramp towards the set point at a fixed rate
    Ramp { rate_per_sec: f64 },
    Fixed(f64),
    Scripted(VecDeque<f64>),
}

/// Simulated climate chamber
pub struct SimChamber {
    harness: SimHarness,
    bounds: TemperatureBounds,
    set_point: Option<f64>,
    temperature: f64,
    last_update: Instant,
    readings: Readings,
}

impl SimChamber {
    pub fn new(harness: &SimHarness) -> Self {
        Self {
            harness: harness.clone(),
            bounds: TemperatureBounds::new(-40.0, 180.0),
            set_point: None,
            temperature: AMBIENT_CELSIUS,
            last_update: Instant::now(),
            readings: Readings::Ramp {
                rate_per_sec: 1.0 / 60.0,
            },
        }
    }

    pub fn bounds(mut self, bounds: TemperatureBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Temperature change rate while running, °C per minute
    pub fn ramp_rate(mut self, celsius_per_minute: f64) -> Self {
        self.readings = Readings::Ramp {
            rate_per_sec: celsius_per_minute / 60.0,
        };
        self
    }

    /// Always report the same temperature
    pub fn fixed_reading(mut self, celsius: f64) -> Self {
        self.readings = Readings::Fixed(celsius);
        self
    }

    /// Report these temperatures in order, repeating the last one
    pub fn scripted(mut self, readings: impl IntoIterator<Item = f64>) -> Self {
        self.readings = Readings::Scripted(readings.into_iter().collect());
        self
    }

    fn running(&self) -> bool {
        self.harness.shared.chamber_running.load(Ordering::SeqCst)
    }

    fn set_running(&self, running: bool) {
        self.harness
            .shared
            .chamber_running
            .store(running, Ordering::SeqCst);
    }

    fn advance_model(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        let (Readings::Ramp { rate_per_sec }, Some(target)) = (&self.readings, self.set_point)
        else {
            return;
        };
        if !self.running() {
            return;
        }

        let step = *rate_per_sec * elapsed;
        let delta = target - self.temperature;
        if delta.abs() <= step {
            self.temperature = target;
        } else {
            self.temperature += step.copysign(delta);
        }
    }
}

#[async_trait]
impl ClimateChamber for SimChamber {
    async fn set_temperature(&mut self, celsius: f64) -> InstrumentResult<()> {
        self.harness.record("chamber.set_temperature")?;
        if !self.bounds.contains(celsius) {
            return Err(InstrumentError::Rejected(format!(
                "set point {celsius} °C outside {}",
                self.bounds
            )));
        }
        self.advance_model();
        self.set_point = Some(celsius);
        Ok(())
    }

    async fn start(&mut self) -> InstrumentResult<()> {
        self.harness.record("chamber.start")?;
        self.advance_model();
        self.set_running(true);
        Ok(())
    }

    async fn stop(&mut self) -> InstrumentResult<()> {
        self.harness.record("chamber.stop")?;
        self.advance_model();
        self.set_running(false);
        Ok(())
    }

    async fn is_running(&mut self) -> InstrumentResult<bool> {
        self.harness.record("chamber.is_running")?;
        Ok(self.running())
    }

    async fn current_temperature(&mut self) -> InstrumentResult<f64> {
        self.harness.record("chamber.current_temperature")?;
        let reading = match &mut self.readings {
            Readings::Fixed(t) => *t,
            Readings::Scripted(queue) => {
                let next = if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().copied()
                };
                next.unwrap_or(self.temperature)
            }
            Readings::Ramp { .. } => {
                self.advance_model();
                self.temperature
            }
        };
        Ok(reading)
    }

    fn temperature_bounds(&self) -> TemperatureBounds {
        self.bounds
    }
}
