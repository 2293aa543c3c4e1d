//! Shared retry policy for every outbound provider connection
//! (control-plane REST calls, ASR/TTS websocket dials).
//!
//! Grounded on `manage_api_client.py::_execute_async_request` (6
//! attempts, retry only on transport errors or a fixed status-code
//! set, never on business errors) generalized to the exponential
//! capped backoff spec.md calls for (the original actually sleeps a
//! flat `retry_delay` between attempts; spec.md explicitly documents
//! exponential-capped backoff, and spec.md's explicit text wins — see
//! DESIGN.md).

use std::time::Duration;
use tracing::warn;

use crate::voice::errors::RetryClass;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.saturating_mul(1u32 << attempt.min(4));
        scaled.min(self.max_delay)
    }

    /// Run `op` up to `max_attempts` times. `classify` inspects the
    /// error from a failed attempt and decides whether to retry.
    /// Business errors and anything `classify` doesn't mark retryable
    /// are returned immediately.
    pub async fn run<T, F, Fut>(&self, label: &str, classify: impl Fn(&anyhow::Error) -> RetryClass, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let class = classify(&e);
                    if class != RetryClass::Retryable || attempt + 1 == self.max_attempts {
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    warn!(label, attempt, delay_ms = delay.as_millis() as u64, "retrying after error: {}", e);
                    last_err = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{label}: all retry attempts failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy { initial_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), ..Default::default() };
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts2 = attempts.clone();
        let result = policy
            .run("test", |_| RetryClass::Retryable, move || {
                let attempts = attempts2.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        anyhow::bail!("transient failure")
                    }
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let policy = RetryPolicy { initial_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5), ..Default::default() };
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts2 = attempts.clone();
        let result = policy
            .run("test", |_| RetryClass::BusinessError, move || {
                let attempts = attempts2.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("device not bound")
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
