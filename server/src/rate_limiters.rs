use std::sync::atomic::Ordering::Relaxed;
use std::sync::{atomic::AtomicBool, Arc};
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

/// Process-wide concurrency/rate limiting for the LLM client (spec.md §5:
/// "implementations SHOULD apply a process-wide concurrency limit and
/// optional rate limiter"). A `429`/rate-limit response from the provider
/// flips `backoff` for a cooldown window instead of failing every
/// in-flight call immediately.
#[derive(Clone)]
pub struct LlmRateLimiter {
    bucket: Arc<RateLimiter>,
    backoff: Arc<AtomicBool>,
    backoff_duration: Duration,
}

impl LlmRateLimiter {
    pub fn new(rate_per_sec: usize, max: usize) -> Self {
        let bucket = RateLimiter::builder()
            .initial(rate_per_sec)
            .interval(Duration::from_secs(1))
            .max(max)
            .refill(rate_per_sec)
            .build();

        Self {
            bucket: Arc::new(bucket),
            backoff: Arc::new(AtomicBool::new(false)),
            backoff_duration: Duration::from_secs(60),
        }
    }

    pub async fn acquire_one(&self) {
        if self.backoff.load(Relaxed) {
            tokio::time::sleep(self.backoff_duration).await;
        }
        self.bucket.acquire_one().await;
    }

    pub fn trigger_backoff(&self) {
        tracing::warn!("LLM rate limiter entering backoff");
        self.backoff.store(true, Relaxed);
        let self_ = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(self_.backoff_duration).await;
            tracing::info!("LLM rate limiter backoff expired");
            self_.backoff.store(false, Relaxed);
        });
    }

    pub fn status(&self) -> String {
        format!("{}/{}", self.bucket.balance(), self.bucket.max())
    }
}
