//! Data models for test runs
//!
//! This module contains all data structures used throughout the application.

mod condition;
mod result;
mod run_config;

pub use condition::{ConditionLabel, ConditionPoint};
pub use result::{RunOutcome, RunResult, RunSummary, StepResult};
pub use run_config::{SupplyMode, TestRunConfig, ValueRange};
