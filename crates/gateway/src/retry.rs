use std::future::Future;
use std::time::Duration;

use tracing::warn;

use chatrelay_agent::gateway::GatewayError;
use chatrelay_core::config::GATEWAY_MAX_BACKOFF_SECS;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 250,
            max_delay_ms: GATEWAY_MAX_BACKOFF_SECS * 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self { max_retries, ..Self::default() }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent. The last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        event_name = "gateway.send.retrying",
                        operation = operation_name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "gateway send failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use chatrelay_agent::gateway::GatewayError;

    use super::RetryPolicy;

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy { max_retries: 5, base_delay_ms: 100, max_delay_ms: 1_000 };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(60), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result = instant_policy(3)
            .run("send_text", move || async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 {
                    Err(GatewayError::Transport("reset".to_string()))
                } else {
                    Ok("delivered")
                }
            })
            .await;

        assert_eq!(result.expect("eventually delivered"), "delivered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<(), GatewayError> = instant_policy(2)
            .run("send_text", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Status { status: 502, body: String::new() })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Status { status: 502, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejections_are_not_retried() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;

        let result: Result<(), GatewayError> = instant_policy(5)
            .run("send_image", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Rejected("invalid target".to_string()))
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Rejected(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
