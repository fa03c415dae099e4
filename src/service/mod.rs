mod ranked;
mod schedule;

pub use ranked::RankedEntityService;
pub use schedule::{ScheduleRequest, ScheduleService};

use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::RankedKind;
use crate::store::RankedStore;

/// Bounded retry for units of work refused with `TransactionConflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, the first one included.
    pub attempts: u32,
    /// Sleep before retry `n` is `n * backoff`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

/// Run `work` against a fresh working set of `kind` and commit it.
///
/// The whole read-compute-write sequence restarts on conflict. Any other
/// error drops the working set, which discards everything `work` staged.
pub async fn with_transaction<S, T, F>(
    store: &S,
    kind: RankedKind,
    retry: RetryPolicy,
    mut work: F,
) -> Result<T>
where
    S: RankedStore + ?Sized,
    F: FnMut(&mut S::Tx) -> Result<T>,
{
    let attempts = retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        let mut tx = store.begin(kind).await?;
        let value = work(&mut tx)?;
        match store.commit(tx).await {
            Ok(()) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::debug!("{kind} transaction conflict, attempt {attempt}/{attempts}");
                tokio::time::sleep(retry.backoff * attempt).await;
                attempt += 1;
            }
            Err(Error::TransactionConflict(kind)) => {
                tracing::warn!("{kind} transaction gave up after {attempts} attempts");
                return Err(Error::TransactionConflict(kind));
            }
            Err(e) => return Err(e),
        }
    }
}
