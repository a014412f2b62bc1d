use crate::config::LimitsConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};

/// Write throttle in front of the document store: a token bucket over
/// writes per minute plus an optional cap on in-flight writes.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    writes_per_min: u64,
    // tokens available and time of last refill
    tokens: Mutex<(f64, Instant)>,
    sem: Option<Semaphore>,
}

/// Held for the duration of a write; releases the concurrency slot on drop.
pub struct WritePermit<'a> {
    _permit: Option<SemaphorePermit<'a>>,
}

impl RateLimiter {
    pub fn new(writes_per_min: u64, concurrency: Option<u32>) -> Self {
        let sem = concurrency
            .filter(|c| *c > 0)
            .map(|c| Semaphore::new(c as usize));
        Self {
            inner: Arc::new(Inner {
                writes_per_min,
                tokens: Mutex::new((writes_per_min as f64, Instant::now())),
                sem,
            }),
        }
    }

    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self::new(limits.writes_per_minute, limits.concurrency)
    }

    pub fn unlimited() -> Self {
        Self::new(0, None)
    }

    /// Waits until one more write is allowed.
    pub async fn acquire(&self) -> WritePermit<'_> {
        let permit = match &self.inner.sem {
            // the semaphore is never closed
            Some(sem) => sem.acquire().await.ok(),
            None => None,
        };

        if self.inner.writes_per_min > 0 {
            self.consume(self.inner.writes_per_min as f64, 60.0, 1.0).await;
        }

        WritePermit { _permit: permit }
    }

    async fn consume(&self, capacity: f64, period_secs: f64, cost: f64) {
        loop {
            let mut guard = self.inner.tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            let refill_rate = capacity / period_secs;
            *tokens = (*tokens + now.duration_since(*last).as_secs_f64() * refill_rate).min(capacity);
            *last = now;
            if *tokens >= cost {
                *tokens -= cost;
                return;
            }
            let wait = (cost - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.001))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_bucket_is_immediate() {
        let limiter = RateLimiter::new(120, None);
        let start = Instant::now();
        for _ in 0..120 {
            let _p = limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_empty_bucket_waits_for_refill() {
        // 600/min refills one token every 100ms
        let limiter = RateLimiter::new(600, Some(1));
        for _ in 0..600 {
            let _p = limiter.acquire().await;
        }
        let start = Instant::now();
        let _p = limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..10_000 {
            let _p = limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
