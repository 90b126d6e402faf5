//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap an operation with a deadline
//! - Keep deadline-exceeded distinct from operation errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - On expiry the pending future is dropped; work it already spawned may keep running

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Why a bounded call did not produce a value.
#[derive(Debug, Error)]
pub enum DeadlineError<E> {
    /// The deadline elapsed first.
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),

    /// The operation completed with an error.
    #[error("operation failed: {0}")]
    Failed(E),
}

/// Run `fut` for at most `deadline`.
pub async fn with_deadline<Fut, T, E>(deadline: Duration, fut: Fut) -> Result<T, DeadlineError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DeadlineError::Failed(e)),
        Err(_) => Err(DeadlineError::Elapsed(deadline)),
    }
}
