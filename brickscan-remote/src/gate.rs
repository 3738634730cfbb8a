//! Rate-limited, retrying gate in front of one remote service

use crate::error::RemoteError;
use brickscan_core::{RetryConfig, ServiceConfig};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Spaces attempts at least `min_interval` apart and retries transient failures
///
/// The interval applies to every issued attempt, retries included, across
/// all callers sharing the gate.
pub struct RequestGate {
    name: String,
    min_interval: Duration,
    retry: RetryConfig,
    last_issued: Mutex<Option<Instant>>,
    issued: AtomicU64,
}

impl RequestGate {
    pub fn new(name: impl Into<String>, min_interval: Duration, retry: RetryConfig) -> Self {
        Self {
            name: name.into(),
            min_interval,
            retry,
            last_issued: Mutex::new(None),
            issued: AtomicU64::new(0),
        }
    }

    pub fn for_service(name: impl Into<String>, config: &ServiceConfig) -> Self {
        Self::new(name, config.min_interval(), config.retry.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempts issued so far, retries included
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Run `operation`, retrying transient failures with exponential backoff
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.wait_turn().await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt - 1);
                    debug!(
                        "{} request failed ({}), retrying in {}ms (attempt {}/{})",
                        self.name,
                        e,
                        delay.as_millis(),
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    warn!("{} request failed after {} attempts: {}", self.name, attempt, e);
                    return Err(RemoteError::Exhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Block until the interval since the previous attempt has elapsed, then claim the slot
    async fn wait_turn(&self) {
        let mut last = self.last_issued.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
        self.issued.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let gate = RequestGate::new("test", Duration::ZERO, fast_retry(2));
        let result = gate.execute(|| async { Ok::<_, RemoteError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(gate.issued(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let gate = RequestGate::new("test", Duration::ZERO, fast_retry(2));
        let calls = AtomicU32::new(0);
        let result = gate
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RemoteError::Server(503))
                } else {
                    Ok("ok")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(gate.issued(), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let gate = RequestGate::new("test", Duration::ZERO, fast_retry(2));
        let result: Result<(), _> = gate.execute(|| async { Err(RemoteError::RateLimit) }).await;
        match result {
            Err(RemoteError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, RemoteError::RateLimit));
            }
            other => panic!("Expected Exhausted, got {:?}", other),
        }
        assert_eq!(gate.issued(), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let gate = RequestGate::new("test", Duration::ZERO, fast_retry(5));
        let result: Result<(), _> = gate
            .execute(|| async { Err(RemoteError::AuthenticationFailed) })
            .await;
        assert!(matches!(result, Err(RemoteError::AuthenticationFailed)));
        assert_eq!(gate.issued(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let gate = RequestGate::new("test", Duration::ZERO, fast_retry(0));
        let result: Result<(), _> = gate.execute(|| async { Err(RemoteError::Server(500)) }).await;
        assert!(matches!(result, Err(RemoteError::Exhausted { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn test_min_interval_between_calls() {
        let interval = Duration::from_millis(50);
        let gate = RequestGate::new("test", interval, fast_retry(0));
        let start = std::time::Instant::now();
        for _ in 0..4 {
            gate.execute(|| async { Ok::<_, RemoteError>(()) }).await.unwrap();
        }
        assert!(start.elapsed() >= interval * 3);
        assert_eq!(gate.issued(), 4);
    }

    #[tokio::test]
    async fn test_interval_applies_to_concurrent_callers() {
        let interval = Duration::from_millis(40);
        let gate = Arc::new(RequestGate::new("shared", interval, fast_retry(0)));
        let start = std::time::Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                gate.execute(|| async { Ok::<_, RemoteError>(()) }).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(start.elapsed() >= interval * 2);
    }
}
