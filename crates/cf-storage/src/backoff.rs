//! Jittered exponential backoff shared by storage and (via the same shape)
//! batch-service retries.

use std::time::Duration;

use rand::Rng;

/// Retry budget for a class of operations.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    /// Policy for storage operations: `max_backoff=8s`, 100 attempts (§4.1).
    #[must_use]
    pub const fn storage() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(8),
            max_attempts: 100,
        }
    }

    /// Policy for registry-pull retries in the image driver: `max_backoff=300s`,
    /// unbounded attempts (the pull is abandoned by its caller on a non-transient
    /// error, not by exhausting this budget) (§4.7 step 3).
    #[must_use]
    pub const fn registry_pull() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
            max_attempts: u32::MAX,
        }
    }

    /// Maximum number of retry attempts this policy allows.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to sleep before the given (1-based) retry attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.min(16);
        let exp_ms = self.base.as_millis().saturating_mul(1u128 << shift);
        let capped_ms = exp_ms.min(self.max.as_millis()).max(1);
        let half = (capped_ms / 2).max(1);
        let jittered_ms = rand::rng().random_range(half..=capped_ms);
        Duration::from_millis(u64::try_from(jittered_ms).unwrap_or(u64::MAX))
    }
}

/// Retry `op` while `classify_transient(&err)` is true, sleeping between
/// attempts per `policy`. Returns the first non-transient error, or the last
/// transient error once the attempt budget is exhausted.
pub async fn retry_transient<F, Fut, T, E>(
    policy: &BackoffPolicy,
    classify_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if classify_transient(&err) && attempt < policy.max_attempts() => {
                attempt += 1;
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_max() {
        let policy = BackoffPolicy::storage();
        for attempt in 0..30 {
            assert!(policy.delay_for(attempt) <= Duration::from_secs(8));
        }
    }

    #[tokio::test]
    async fn retry_transient_stops_on_non_transient_error() {
        let policy = BackoffPolicy::storage();
        let mut calls = 0;
        let result: std::result::Result<(), &str> = retry_transient(
            &policy,
            |_err: &&str| false,
            || {
                calls += 1;
                async { Err("permanent") }
            },
        )
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retry_transient_retries_until_success() {
        let policy = BackoffPolicy::storage();
        let mut calls = 0;
        let result = retry_transient(
            &policy,
            |_err: &&str| true,
            || {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt < 3 {
                        Err("again")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls, 3);
    }
}
