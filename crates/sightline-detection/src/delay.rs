use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DetectionError;

/// Timed wait between status polls.
///
/// Implementations must return `DetectionError::Cancelled` as soon as the
/// token fires.
#[async_trait]
pub trait Delay: Send + Sync {
  async fn wait(&self, duration: Duration, cancel: &CancellationToken)
  -> Result<(), DetectionError>;
}

/// Sleeps on the tokio timer, racing the cancellation token.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
  async fn wait(
    &self,
    duration: Duration,
    cancel: &CancellationToken,
  ) -> Result<(), DetectionError> {
    cancellable(cancel, tokio::time::sleep(duration)).await
  }
}

/// Race `fut` against the cancellation token.
pub async fn cancellable<F: Future>(
  cancel: &CancellationToken,
  fut: F,
) -> Result<F::Output, DetectionError> {
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(DetectionError::Cancelled),
    out = fut => Ok(out),
  }
}
