//! Climate chamber stabilization
//!
//! Drives the chamber to a set point and polls until the reading is within
//! tolerance. The primary budget may be followed by a single grace window;
//! only a `Settled` outcome lets the run continue.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::CancellationToken;
use crate::config::TimingConfig;
use crate::instruments::{ClimateChamber, InstrumentError};

/// Timing and tolerance of one stabilization wait
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilizationPolicy {
    pub poll_interval: Duration,
    pub primary_budget: Duration,
    pub grace_window: Duration,
    /// Accepted |reading - target|, °C
    pub tolerance: f64,
}

impl StabilizationPolicy {
    pub fn new(
        poll_interval: Duration,
        primary_budget: Duration,
        grace_window: Duration,
        tolerance: f64,
    ) -> Self {
        Self {
            poll_interval,
            primary_budget,
            grace_window,
            tolerance,
        }
    }
}

impl From<&TimingConfig> for StabilizationPolicy {
    fn from(timing: &TimingConfig) -> Self {
        Self::new(
            timing.poll_interval(),
            timing.primary_budget(),
            timing.grace_window(),
            timing.tolerance_celsius,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StabilizationState {
    Idle,
    SettingPoint,
    Heating,
    Cooling,
    Settled,
    TimedOut,
    Cancelled,
    ChamberError,
}

impl fmt::Display for StabilizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StabilizationState::Idle => "idle",
            StabilizationState::SettingPoint => "setting point",
            StabilizationState::Heating => "heating",
            StabilizationState::Cooling => "cooling",
            StabilizationState::Settled => "settled",
            StabilizationState::TimedOut => "timed out",
            StabilizationState::Cancelled => "cancelled",
            StabilizationState::ChamberError => "chamber error",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StabilizationOutcome {
    Settled {
        reading: f64,
        polls: u32,
        used_grace: bool,
    },
    TimedOut {
        reading: f64,
    },
    Cancelled,
    ChamberError(InstrumentError),
}

enum WindowEnd {
    Settled(f64),
    Expired(f64),
    Cancelled,
    Failed(InstrumentError),
}

/// Waits for one chamber set point
pub struct StabilizationWaiter<'a, C: ClimateChamber + ?Sized> {
    chamber: &'a mut C,
    policy: StabilizationPolicy,
    token: &'a CancellationToken,
    state: StabilizationState,
    polls: u32,
}

impl<'a, C: ClimateChamber + ?Sized> StabilizationWaiter<'a, C> {
    pub fn new(
        chamber: &'a mut C,
        policy: StabilizationPolicy,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            chamber,
            policy,
            token,
            state: StabilizationState::Idle,
            polls: 0,
        }
    }

    pub fn state(&self) -> StabilizationState {
        self.state
    }

    /// Set `target`, start the chamber and wait for the reading to settle
    pub async fn wait_for(&mut self, target: f64) -> StabilizationOutcome {
        if self.token.is_cancelled() {
            return self.finish(StabilizationOutcome::Cancelled);
        }

        self.transition(StabilizationState::SettingPoint);
        info!("Setting chamber to {:.1} °C", target);

        if let Err(err) = self.chamber.set_temperature(target).await {
            return self.finish(StabilizationOutcome::ChamberError(err));
        }
        if self.token.is_cancelled() {
            return self.finish(StabilizationOutcome::Cancelled);
        }
        if let Err(err) = self.chamber.start().await {
            return self.finish(StabilizationOutcome::ChamberError(err));
        }

        let outcome = match self.poll_window(target, self.policy.primary_budget, false).await {
            WindowEnd::Settled(reading) => StabilizationOutcome::Settled {
                reading,
                polls: self.polls,
                used_grace: false,
            },
            WindowEnd::Expired(reading) => {
                warn!(
                    "Chamber at {:.1} °C after {}s, extending by {}s",
                    reading,
                    self.policy.primary_budget.as_secs(),
                    self.policy.grace_window.as_secs()
                );
                match self.poll_window(target, self.policy.grace_window, true).await {
                    WindowEnd::Settled(reading) => StabilizationOutcome::Settled {
                        reading,
                        polls: self.polls,
                        used_grace: true,
                    },
                    WindowEnd::Expired(reading) => StabilizationOutcome::TimedOut { reading },
                    WindowEnd::Cancelled => StabilizationOutcome::Cancelled,
                    WindowEnd::Failed(err) => StabilizationOutcome::ChamberError(err),
                }
            }
            WindowEnd::Cancelled => StabilizationOutcome::Cancelled,
            WindowEnd::Failed(err) => StabilizationOutcome::ChamberError(err),
        };

        self.finish(outcome)
    }

    /// Poll once per tick until settled or `budget` has elapsed.
    ///
    /// The last poll lands on the deadline itself.
    async fn poll_window(&mut self, target: f64, budget: Duration, wait_first: bool) -> WindowEnd {
        let deadline = Instant::now() + budget;

        if wait_first && self.token.sleep(self.policy.poll_interval.min(budget)).await.is_err() {
            return WindowEnd::Cancelled;
        }

        loop {
            if self.token.is_cancelled() {
                return WindowEnd::Cancelled;
            }

            let reading = match self.chamber.current_temperature().await {
                Ok(reading) => reading,
                Err(err) => return WindowEnd::Failed(err),
            };
            self.polls += 1;
            debug!(
                "Chamber reading {:.2} °C (target {:.1} °C, poll {})",
                reading, target, self.polls
            );

            let deviation = reading - target;
            if deviation.abs() <= self.policy.tolerance {
                return WindowEnd::Settled(reading);
            }
            self.transition(if deviation < 0.0 {
                StabilizationState::Heating
            } else {
                StabilizationState::Cooling
            });

            let now = Instant::now();
            if now >= deadline {
                return WindowEnd::Expired(reading);
            }

            let tick = self.policy.poll_interval.min(deadline - now);
            if self.token.sleep(tick).await.is_err() {
                return WindowEnd::Cancelled;
            }
        }
    }

    fn finish(&mut self, outcome: StabilizationOutcome) -> StabilizationOutcome {
        let state = match &outcome {
            StabilizationOutcome::Settled { .. } => StabilizationState::Settled,
            StabilizationOutcome::TimedOut { .. } => StabilizationState::TimedOut,
            StabilizationOutcome::Cancelled => StabilizationState::Cancelled,
            StabilizationOutcome::ChamberError(_) => StabilizationState::ChamberError,
        };
        self.transition(state);
        outcome
    }

    fn transition(&mut self, next: StabilizationState) {
        if self.state != next {
            info!("Chamber stabilization: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::sim::{SimChamber, SimHarness};

    fn policy() -> StabilizationPolicy {
        StabilizationPolicy::new(
            Duration::from_secs(10),
            Duration::from_secs(60),
            Duration::from_secs(20),
            1.0,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_immediately_within_tolerance() {
        let harness = SimHarness::new();
        let mut chamber = SimChamber::new(&harness).fixed_reading(55.4);
        let token = CancellationToken::new();
        let start = Instant::now();

        let mut waiter = StabilizationWaiter::new(&mut chamber, policy(), &token);
        let outcome = waiter.wait_for(55.0).await;

        assert_eq!(
            outcome,
            StabilizationOutcome::Settled {
                reading: 55.4,
                polls: 1,
                used_grace: false
            }
        );
        assert_eq!(waiter.state(), StabilizationState::Settled);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(harness.count("chamber.current_temperature"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_while_ramping() {
        let harness = SimHarness::new();
        let mut chamber = SimChamber::new(&harness).ramp_rate(1.0);
        let token = CancellationToken::new();
        let start = Instant::now();

        let policy = StabilizationPolicy::new(
            Duration::from_secs(30),
            Duration::from_secs(600),
            Duration::from_secs(60),
            1.0,
        );
        let outcome = StabilizationWaiter::new(&mut chamber, policy, &token)
            .wait_for(25.2)
            .await;

        // 23 °C ambient, 0.5 °C per tick
        match outcome {
            StabilizationOutcome::Settled {
                polls, used_grace, ..
            } => {
                assert_eq!(polls, 4);
                assert!(!used_grace);
            }
            other => panic!("expected settled, got {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(90));
        assert!(harness.chamber_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_grace_window() {
        let harness = SimHarness::new();
        let mut chamber = SimChamber::new(&harness).fixed_reading(40.0);
        let token = CancellationToken::new();
        let start = Instant::now();

        let outcome = StabilizationWaiter::new(&mut chamber, policy(), &token)
            .wait_for(55.0)
            .await;

        assert_eq!(outcome, StabilizationOutcome::TimedOut { reading: 40.0 });
        // 7 polls over the primary budget (0..=60 s), 2 in the grace window
        assert_eq!(harness.count("chamber.current_temperature"), 9);
        assert_eq!(start.elapsed(), Duration::from_secs(80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_during_grace_window() {
        let harness = SimHarness::new();
        let readings = std::iter::repeat(40.0).take(7).chain([54.5]);
        let mut chamber = SimChamber::new(&harness).scripted(readings);
        let token = CancellationToken::new();
        let start = Instant::now();

        let outcome = StabilizationWaiter::new(&mut chamber, policy(), &token)
            .wait_for(55.0)
            .await;

        assert_eq!(
            outcome,
            StabilizationOutcome::Settled {
                reading: 54.5,
                polls: 8,
                used_grace: true
            }
        );
        assert_eq!(start.elapsed(), Duration::from_secs(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_set_point() {
        let harness = SimHarness::new();
        let mut chamber = SimChamber::new(&harness);
        let token = CancellationToken::new();

        let mut waiter = StabilizationWaiter::new(&mut chamber, policy(), &token);
        let outcome = waiter.wait_for(200.0).await;

        assert!(matches!(
            outcome,
            StabilizationOutcome::ChamberError(InstrumentError::Rejected(_))
        ));
        assert_eq!(waiter.state(), StabilizationState::ChamberError);
        assert_eq!(harness.count("chamber.start"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reading() {
        let harness = SimHarness::new();
        harness.fail_on("chamber.current_temperature");
        let mut chamber = SimChamber::new(&harness);
        let token = CancellationToken::new();

        let outcome = StabilizationWaiter::new(&mut chamber, policy(), &token)
            .wait_for(55.0)
            .await;

        assert!(matches!(
            outcome,
            StabilizationOutcome::ChamberError(InstrumentError::Connection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let harness = SimHarness::new();
        let mut chamber = SimChamber::new(&harness);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = StabilizationWaiter::new(&mut chamber, policy(), &token)
            .wait_for(55.0)
            .await;

        assert_eq!(outcome, StabilizationOutcome::Cancelled);
        assert_eq!(harness.count_prefix("chamber"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_polling() {
        let harness = SimHarness::new();
        let mut chamber = SimChamber::new(&harness).fixed_reading(40.0);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(15)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = StabilizationWaiter::new(&mut chamber, policy(), &token)
            .wait_for(55.0)
            .await;

        assert_eq!(outcome, StabilizationOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(60));
        assert_eq!(harness.count("chamber.current_temperature"), 2);
    }
}
