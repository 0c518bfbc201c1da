//! ERP reference level calibration
//!
//! Adjusts the analyzer reference level offset until the peak marker reads
//! the e.r.p. measured in the anechoic chamber. Subsequent limit checks are
//! then made against radiated rather than conducted power.

use std::time::Duration;
use tracing::{debug, info};

use super::{gated, CancellationToken};
use crate::config::CalibrationConfig;
use crate::error::RunError;
use crate::instruments::{InstrumentKind, SpectrumAnalyzer, TraceMode};
use crate::standard::Detector;

const ANALYZER: InstrumentKind = InstrumentKind::SpectrumAnalyzer;

pub struct ErpCalibrator<'a, A: SpectrumAnalyzer + ?Sized> {
    analyzer: &'a mut A,
    settings: &'a CalibrationConfig,
    token: &'a CancellationToken,
    sweep_settle: Duration,
}

impl<'a, A: SpectrumAnalyzer + ?Sized> ErpCalibrator<'a, A> {
    pub fn new(
        analyzer: &'a mut A,
        settings: &'a CalibrationConfig,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            analyzer,
            settings,
            token,
            sweep_settle: Duration::ZERO,
        }
    }

    /// Wait this long for the trace to settle after every change
    pub fn with_sweep_settle(mut self, settle: Duration) -> Self {
        self.sweep_settle = settle;
        self
    }

    /// Returns the applied reference level offset in dB
    pub async fn calibrate(
        &mut self,
        center_frequency: u64,
        channel_width: u64,
        reference_dbm: f64,
    ) -> Result<f64, RunError> {
        info!("Calibrating reference level to {:.2} dBm e.r.p.", reference_dbm);

        let token = self.token;
        gated(token, ANALYZER, self.analyzer.set_center_frequency(center_frequency)).await?;
        gated(token, ANALYZER, self.analyzer.set_span(channel_width * 6)).await?;
        gated(
            token,
            ANALYZER,
            self.analyzer
                .set_resolution_bandwidth(self.settings.resolution_bandwidth),
        )
        .await?;
        gated(token, ANALYZER, self.analyzer.set_detector(Detector::Rms)).await?;
        gated(token, ANALYZER, self.analyzer.set_trace_mode(1, TraceMode::MaxHold)).await?;

        let mut offset = 0.0;
        let mut peak = self.read_peak(offset).await?;
        let mut converged = (reference_dbm - peak).abs() <= self.settings.tolerance_db;

        let mut iteration = 0;
        while !converged && iteration < self.settings.max_iterations {
            iteration += 1;
            let error = reference_dbm - peak;
            offset += self.settings.step_db.copysign(error);
            peak = self.read_peak(offset).await?;
            debug!(
                "Calibration step {}: offset {:+.2} dB, peak {:.2} dBm",
                iteration, offset, peak
            );

            // Stepped across or onto the reference
            let remaining = reference_dbm - peak;
            converged = remaining * error <= 0.0 || remaining.abs() <= self.settings.tolerance_db;
        }

        if !converged {
            return Err(RunError::Unexpected(format!(
                "ERP calibration did not converge after {} steps (peak {:.2} dBm, reference {:.2} dBm)",
                iteration, peak, reference_dbm
            )));
        }

        info!("Reference level offset set to {:+.2} dB", offset);
        Ok(offset)
    }

    async fn read_peak(&mut self, offset: f64) -> Result<f64, RunError> {
        let token = self.token;
        gated(token, ANALYZER, self.analyzer.set_reference_level_offset(offset)).await?;
        token.sleep(self.sweep_settle).await?;
        gated(token, ANALYZER, self.analyzer.peak_marker_level()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::sim::{SimAnalyzer, SimHarness};

    async fn run(
        analyzer: &mut SimAnalyzer,
        settings: &CalibrationConfig,
        reference: f64,
    ) -> Result<f64, RunError> {
        let token = CancellationToken::new();
        ErpCalibrator::new(analyzer, settings, &token)
            .calibrate(169_612_500, 12_500, reference)
            .await
    }

    #[tokio::test]
    async fn test_steps_up_to_reference() {
        let harness = SimHarness::new();
        let mut analyzer = SimAnalyzer::new(&harness).peak_level(8.0);

        let offset = run(&mut analyzer, &CalibrationConfig::default(), 10.0)
            .await
            .unwrap();

        assert_eq!(offset, 2.0);
        // initial zero plus four 0.5 dB steps
        assert_eq!(harness.count("analyzer.set_reference_level_offset"), 5);
    }

    #[tokio::test]
    async fn test_steps_down_to_reference() {
        let harness = SimHarness::new();
        let mut analyzer = SimAnalyzer::new(&harness).peak_level(8.0);

        let offset = run(&mut analyzer, &CalibrationConfig::default(), 6.8)
            .await
            .unwrap();

        // 7.0 dBm is within 0.25 dB of the reference
        assert_eq!(offset, -1.0);
    }

    #[tokio::test]
    async fn test_within_tolerance_needs_no_adjustment() {
        let harness = SimHarness::new();
        let mut analyzer = SimAnalyzer::new(&harness).peak_level(8.0);

        let offset = run(&mut analyzer, &CalibrationConfig::default(), 8.2)
            .await
            .unwrap();

        assert_eq!(offset, 0.0);
        assert_eq!(harness.count("analyzer.set_reference_level_offset"), 1);
        assert_eq!(harness.count("analyzer.peak_marker_level"), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_iterations() {
        let harness = SimHarness::new();
        let mut analyzer = SimAnalyzer::new(&harness).peak_level(8.0);
        let settings = CalibrationConfig {
            max_iterations: 3,
            ..Default::default()
        };

        let err = run(&mut analyzer, &settings, 20.0).await.unwrap_err();
        assert!(matches!(err, RunError::Unexpected(ref msg) if msg.contains("did not converge")));
        assert_eq!(harness.count("analyzer.peak_marker_level"), 4);
    }

    #[tokio::test]
    async fn test_zero_iterations_never_accepts_an_offset() {
        let harness = SimHarness::new();
        let mut analyzer = SimAnalyzer::new(&harness).peak_level(8.0);
        let settings = CalibrationConfig {
            max_iterations: 0,
            ..Default::default()
        };

        let err = run(&mut analyzer, &settings, 10.0).await.unwrap_err();
        assert!(matches!(err, RunError::Unexpected(ref msg) if msg.contains("after 0 steps")));
        assert_eq!(harness.count("analyzer.peak_marker_level"), 1);

        // already on the reference, nothing to step
        let offset = run(&mut analyzer, &settings, 8.1).await.unwrap();
        assert_eq!(offset, 0.0);
    }

    #[tokio::test]
    async fn test_cancelled_calibration_stops() {
        let harness = SimHarness::new();
        let mut analyzer = SimAnalyzer::new(&harness);
        let settings = CalibrationConfig::default();
        let token = CancellationToken::new();
        token.cancel();

        let err = ErpCalibrator::new(&mut analyzer, &settings, &token)
            .calibrate(169_612_500, 12_500, 10.0)
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Cancelled));
        assert!(harness.calls().is_empty());
    }
}
