//! Retry helper for read-modify-write updates under optimistic concurrency.

use std::future::Future;
use std::time::Duration;

use anyhow::Error;
use tokio::time::{sleep, Instant};
use tracing::{error, warn};

/// Bounds for an update that may race with other writers.
#[derive(Clone, Debug)]
pub struct ConflictRetry {
    /// Upper bound on loop iterations, refreshes included.
    pub max_attempts: u32,
    /// Conflicts are only retried while this much wall-clock time has not elapsed.
    pub deadline: Duration,
    /// Pause after each conflict.
    pub interval: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            deadline: Duration::from_secs(5),
            interval: Duration::from_millis(750),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// `apply` accepted the mutated object.
    Applied,
    /// The freshest copy already satisfied `mutate`; nothing was written.
    AlreadyApplied,
    /// Attempts ran out before an update went through.
    Exhausted,
}

/// Applies `mutate` to a copy of the object and writes it with `apply`.
///
/// When `mutate` reports there is nothing to change on a copy that was never
/// refreshed, the object is re-read with `refresh` once before giving up, so a
/// stale local copy never short-circuits the update. A write failing with an
/// error matched by `is_conflict` is retried against a refreshed copy while
/// the deadline has not passed. Any other write error is returned as is.
pub async fn update_on_conflict<T, R, RFut, M, A, AFut, C>(
    policy: &ConflictRetry,
    operation_name: &str,
    initial: T,
    mut refresh: R,
    mut mutate: M,
    mut apply: A,
    is_conflict: C,
) -> Result<UpdateOutcome, Error>
where
    T: Clone,
    R: FnMut() -> RFut,
    RFut: Future<Output = Result<T, Error>>,
    M: FnMut(&mut T) -> bool,
    A: FnMut(T) -> AFut,
    AFut: Future<Output = Result<(), Error>>,
    C: Fn(&Error) -> bool,
{
    let deadline = Instant::now() + policy.deadline;
    let mut current = initial;
    let mut refreshed = false;
    let mut needs_refresh = false;

    for attempt in 1..=policy.max_attempts {
        if needs_refresh {
            match refresh().await {
                Ok(fresh) => {
                    current = fresh;
                    refreshed = true;
                }
                Err(e) => warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Failed to refresh object, reusing previous copy"
                ),
            }
            needs_refresh = false;
        }

        let mut candidate = current.clone();
        if !mutate(&mut candidate) {
            if !refreshed {
                needs_refresh = true;
                continue;
            }
            return Ok(UpdateOutcome::AlreadyApplied);
        }

        match apply(candidate).await {
            Ok(()) => return Ok(UpdateOutcome::Applied),
            Err(e) if is_conflict(&e) && Instant::now() < deadline => {
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Update conflicted, retrying with a fresh copy"
                );
                needs_refresh = true;
                sleep(policy.interval).await;
            }
            Err(e) => {
                warn!(operation = %operation_name, attempt = attempt, error = %e, "Update failed");
                return Err(e);
            }
        }
    }

    error!(
        operation = %operation_name,
        attempts = policy.max_attempts,
        "Could not apply update within the attempt budget"
    );
    Ok(UpdateOutcome::Exhausted)
}
