//! Cooperative cancellation
//!
//! One writer (the caller holding the run handle) sets the flag; the worker
//! and every instrument call site read it. Once set it stays set.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::RunError;
use crate::instruments::{InstrumentKind, InstrumentResult};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation flag for one run
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<(), RunError> {
        if self.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<(), RunError> {
        self.check()?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(RunError::Cancelled),
        }
    }
}

/// Issue one instrument command, gated by the token before and after.
///
/// The command itself is never interrupted; only the next one is refused.
pub async fn gated<T, F>(
    token: &CancellationToken,
    instrument: InstrumentKind,
    command: F,
) -> Result<T, RunError>
where
    F: Future<Output = InstrumentResult<T>>,
{
    token.check()?;
    let value = command
        .await
        .map_err(|source| RunError::instrument(instrument, source))?;
    token.check()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::InstrumentError;
    use tokio::time::Instant;
    use tokio_test::assert_err;

    #[test]
    fn test_cancel_is_sticky() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        let reader = token.clone();
        token.cancel();
        token.cancel();
        assert!(reader.is_cancelled());
        assert!(matches!(reader.check(), Err(RunError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let token = CancellationToken::new();
        let start = Instant::now();
        token.sleep(Duration::from_secs(5)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = assert_err!(token.sleep(Duration::from_secs(600)).await);
        assert!(matches!(err, RunError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_gated_skips_command_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let mut issued = false;
        let result = gated(&token, InstrumentKind::PowerSupply, async {
            issued = true;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(RunError::Cancelled)));
        assert!(!issued);
    }

    #[tokio::test]
    async fn test_gated_maps_instrument_errors() {
        let token = CancellationToken::new();
        let result: Result<(), _> = gated(&token, InstrumentKind::SpectrumAnalyzer, async {
            Err(InstrumentError::Protocol("bad reply".to_string()))
        })
        .await;
        assert!(matches!(
            result,
            Err(RunError::Instrument {
                instrument: InstrumentKind::SpectrumAnalyzer,
                ..
            })
        ));
    }
}
