//! Transient-conflict retry with truncated exponential backoff.
//!
//! Budget: base 20 ms, factor 2, uniform jitter up to 10 ms, capped at
//! 3 attempts. After exhaustion the last `TransientStore` error surfaces
//! so the worker can leave the record un-ACKed for redelivery.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::metrics::EngineMetrics;
use crate::types::{EngineError, EngineResult};

/// Backoff budget for transient graph conflicts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub factor: u32,
    pub jitter_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 20,
            factor: 2,
            jitter_ms: 10,
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (0-based attempt that just failed).
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms * u64::from(self.factor.pow(attempt));
        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
        Duration::from_millis(base + jitter)
    }

    /// Run `op`, retrying on `TransientStore` within the budget. Any other
    /// error propagates immediately.
    pub async fn run<T, F, Fut>(
        &self,
        metrics: &Arc<EngineMetrics>,
        mut op: F,
    ) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(EngineError::TransientStore(msg)) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        metrics
                            .retries_exhausted
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        return Err(EngineError::TransientStore(msg));
                    }
                    metrics
                        .store_retries
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    let delay = self.backoff(attempt - 1);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "transient store conflict, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_conflicts() {
        let metrics = Arc::new(EngineMetrics::new());
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: EngineResult<u32> = policy
            .run(&metrics, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::TransientStore("deadlock".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.store_retries.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.retries_exhausted.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_transient_error() {
        let metrics = Arc::new(EngineMetrics::new());
        let policy = RetryPolicy::default();

        let result: EngineResult<()> = policy
            .run(&metrics, || async {
                Err(EngineError::TransientStore("serialization".into()))
            })
            .await;

        assert!(matches!(result, Err(EngineError::TransientStore(_))));
        assert_eq!(metrics.retries_exhausted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn fatal_errors_do_not_retry() {
        let metrics = Arc::new(EngineMetrics::new());
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: EngineResult<()> = policy
            .run(&metrics, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EngineError::Store("constraint violation".into())) }
            })
            .await;

        assert!(matches!(result, Err(EngineError::Store(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
