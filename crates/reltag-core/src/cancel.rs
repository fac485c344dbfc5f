//! Cancellation of store-bound work.

use std::future::Future;

pub use tokio_util::sync::CancellationToken;

use crate::domain::{ReltagError, Result};

/// Drive `work` to completion unless `cancel` fires first.
///
/// Dropping `work` on cancellation abandons any store call in flight; the
/// store keeps whatever it had already committed.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReltagError::Cancelled),
        result = work => result,
    }
}
