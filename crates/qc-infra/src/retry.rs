//! Bounded retry used to wait for the controller to converge.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tracing::debug;

use crate::{Error, Sleeper};

/// Delay between polling attempts.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How many times to poll and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// One attempt per two seconds of `timeout_secs`, at least one, one second
    /// apart. The total wait is therefore about half the timeout.
    pub fn from_timeout(timeout_secs: u64) -> Self {
        let attempts = (timeout_secs / 2).max(1);
        Self {
            max_attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            interval: POLL_INTERVAL,
        }
    }
}

/// Every attempt failed. `last` is the error from the final attempt.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for Exhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last)
    }
}

impl Exhausted<Error> {
    pub fn into_timeout(self, waiting_for: &'static str) -> Error {
        Error::ConvergenceTimeout {
            waiting_for,
            attempts: self.attempts,
            last: Box::new(self.last),
        }
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` attempts have failed,
/// sleeping `policy.interval` on `sleeper` between attempts.
pub async fn retry_until_success<T, E, F, Fut>(
    policy: &RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    mut op: F,
) -> Result<T, Exhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let backoff = ConstantBuilder::default()
        .with_delay(policy.interval)
        .with_max_times((max_attempts - 1) as usize);
    let attempts = AtomicU32::new(0);

    let result = (|| {
        attempts.fetch_add(1, Ordering::Relaxed);
        op()
    })
    .retry(backoff)
    .sleep(move |delay: Duration| {
        let sleeper = Arc::clone(&sleeper);
        async move { sleeper.sleep(delay).await }
    })
    .notify(|e: &E, delay: Duration| {
        debug!(
            attempt = attempts.load(Ordering::Relaxed),
            max_attempts,
            ?delay,
            error = %e,
            "condition not met, retrying"
        );
    })
    .await;

    let attempts = attempts.into_inner();
    match result {
        Ok(value) => {
            debug!(attempt = attempts, "condition met");
            Ok(value)
        }
        Err(last) => Err(Exhausted { attempts, last }),
    }
}
