//! Injectable, cancellable waiting.
//!
//! Page delays and the sync throttle both sleep through a [`Delay`] so tests
//! can substitute a recorder (or run under `tokio::time::pause`).

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned when a wait is interrupted by the cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Something that can sleep for a duration.
pub trait Delay: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

impl TokioDelay {
    pub fn shared() -> Arc<dyn Delay> {
        Arc::new(Self)
    }
}

impl Delay for TokioDelay {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Sleep unless `cancel` fires first.
pub async fn wait(
    delay: &dyn Delay,
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = delay.sleep(duration) => Ok(()),
    }
}
