//! Shared utilities

pub mod logger;
pub mod timer;
pub mod units;

pub use logger::{init_logger, LogLevel};
pub use timer::{Stopwatch, Timer};
pub use units::{format_frequency, parse_frequency};
