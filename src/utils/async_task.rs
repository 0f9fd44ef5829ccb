use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::CoordinationError;
use crate::Error;
use crate::Result;

/// Run `task` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt budget is spent.
///
/// Each attempt is bounded by `policy.timeout_ms`. Between attempts the delay
/// doubles from `base_delay_ms` up to `max_delay_ms`, with up to 50% jitter so
/// competing writers do not retry in lockstep. The last error is returned
/// unchanged once attempts run out.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P, R>(
    name: &str,
    mut task: F,
    policy: BackoffPolicy,
    is_retryable: R,
) -> Result<P>
where
    F: FnMut() -> T,
    T: std::future::Future<Output = Result<P>>,
    R: Fn(&Error) -> bool,
{
    let max_attempts = policy.max_retries.max(1);
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let mut delay = Duration::from_millis(policy.base_delay_ms);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let e = match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) => e,
            Err(_) => CoordinationError::Timeout {
                path: name.to_string(),
                duration: timeout_duration,
            }
            .into(),
        };

        if !is_retryable(&e) {
            return Err(e);
        }
        if attempt >= max_attempts {
            warn!(task = name, attempt, "giving up: {}", e);
            return Err(e);
        }

        debug!(task = name, attempt, "retrying after: {}", e);
        sleep(with_jitter(delay)).await;
        delay = (delay * 2).min(max_delay);
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as u64;
    if millis == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=millis / 2);
    Duration::from_millis(millis + jitter)
}
