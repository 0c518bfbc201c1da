//! Test bench and run handles
//!
//! The bench owns the instrument set behind an async mutex. A run takes the
//! owned guard for its whole lifetime, so a second `start_run` is refused
//! with [`RunError::Busy`] instead of queuing behind the first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

use super::{CancellationToken, Sequencer};
use crate::config::BenchConfig;
use crate::error::RunError;
use crate::instruments::InstrumentSet;
use crate::models::{RunOutcome, TestRunConfig};

/// Instruments plus bench configuration; runs one test matrix at a time
pub struct TestBench {
    instruments: Arc<Mutex<InstrumentSet>>,
    config: Arc<BenchConfig>,
    next_run: AtomicU64,
}

impl TestBench {
    pub fn new(instruments: InstrumentSet, config: BenchConfig) -> Self {
        Self {
            instruments: Arc::new(Mutex::new(instruments)),
            config: Arc::new(config),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// `true` while a run holds the instruments
    pub fn is_busy(&self) -> bool {
        self.instruments.try_lock().is_err()
    }

    /// Validate the bench settings and `config`, then start the run on a
    /// background task.
    ///
    /// Configuration errors and `Busy` are returned before anything is
    /// touched; everything later is reported through [`RunHandle::wait`].
    pub fn start_run(&self, config: TestRunConfig) -> Result<RunHandle, RunError> {
        let mut guard = Arc::clone(&self.instruments)
            .try_lock_owned()
            .map_err(|_| RunError::Busy)?;

        self.config
            .validate()
            .map_err(|e| RunError::configuration(format!("{e:#}")))?;
        config.validate(guard.chamber.temperature_bounds())?;

        let id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let bench = Arc::clone(&self.config);
        let worker_token = token.clone();

        info!("Starting run #{}", id);
        tokio::spawn(async move {
            let outcome = Sequencer::new(&mut guard, &bench, config, worker_token)
                .run()
                .await;
            // Release the instruments before the caller hears about it
            drop(guard);
            if tx.send(outcome).is_err() {
                warn!("Run #{} finished but its handle was dropped", id);
            }
        });

        Ok(RunHandle {
            id,
            token,
            completion: rx,
        })
    }
}

/// Caller side of one run
#[derive(Debug)]
pub struct RunHandle {
    id: u64,
    token: CancellationToken,
    completion: oneshot::Receiver<RunOutcome>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Request cancellation; the run still cleans up before completing
    pub fn cancel(&self) {
        info!("Cancellation requested for run #{}", self.id);
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the run to end
    pub async fn wait(self) -> RunOutcome {
        match self.completion.await {
            Ok(outcome) => outcome,
            Err(_) => RunOutcome::Failed(RunError::Unexpected(format!(
                "run #{} worker terminated without reporting",
                self.id
            ))),
        }
    }
}
