use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::debug;

/// Token bucket plus concurrency cap for secondary lookups
///
/// Primary pagination is strictly sequential and never goes through here.
/// Enrichment lookups may run several at a time, and this keeps them from
/// turning a large result set into a burst the service will throttle.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    period: Duration,
    bucket: Mutex<Bucket>,
    in_flight: Arc<Semaphore>,
}

#[derive(Debug)]
struct Bucket {
    tokens: usize,
    last_refill: Instant,
}

impl RateLimiter {
    /// `requests_per_period` requests every `period`, at most `max_concurrent` at once
    pub fn new(requests_per_period: usize, period: Duration, max_concurrent: usize) -> Self {
        let capacity = requests_per_period.max(1);
        Self {
            capacity,
            period: period.max(Duration::from_millis(1)),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            in_flight: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Limits for directory object lookups
    ///
    /// Graph allows a few thousand requests per 10 seconds per app and tenant
    /// for directory reads; staying well under leaves headroom for the
    /// paginated queries running in the same session.
    pub fn for_directory_lookups(max_concurrent: usize) -> Self {
        RateLimiter::new(100, Duration::from_secs(10), max_concurrent)
    }

    /// Waits for a bucket token, then for a concurrency slot
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn acquire(&self) -> Result<RateLimitPermit> {
        loop {
            let wait = self.try_take().await;
            if wait.is_zero() {
                break;
            }
            debug!(wait_ms = wait.as_millis() as u64, "lookup rate limit reached");
            sleep(wait).await;
        }

        let permit = Arc::clone(&self.in_flight)
            .acquire_owned()
            .await
            .context("Failed to acquire lookup concurrency permit")?;

        Ok(RateLimitPermit { _permit: permit })
    }

    /// Takes a token if one is available, otherwise returns how long to wait
    async fn try_take(&self) -> Duration {
        let mut bucket = self.bucket.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill);

        if elapsed >= self.period {
            let periods = (elapsed.as_nanos() / self.period.as_nanos()) as u32;
            bucket.tokens = self.capacity;
            bucket.last_refill += self.period * periods;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            Duration::ZERO
        } else {
            self.period
                .saturating_sub(now.duration_since(bucket.last_refill))
                .max(Duration::from_millis(1))
        }
    }
}

/// Holds a concurrency slot until dropped
#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: OwnedSemaphorePermit,
}
