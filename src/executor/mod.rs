//! Test matrix execution engine
//!
//! Builds the condition matrix, waits for the chamber, runs measurement steps
//! and guarantees instrument cleanup. [`TestBench`] is the entry point.

mod aggregate;
mod bench;
mod calibrate;
mod cancel;
mod matrix;
mod sequencer;
mod stabilize;
mod step;

pub use aggregate::summarize;
pub use bench::TestBench;
pub use calibrate::ErpCalibrator;
pub use cancel::{gated, CancellationToken};
pub use matrix::build_condition_matrix;
pub use sequencer::Sequencer;
pub use stabilize::{StabilizationOutcome, StabilizationPolicy, StabilizationWaiter};
pub use step::{RunContext, StepExecutor};
