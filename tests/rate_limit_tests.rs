use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use entrascope::rate_limit::RateLimiter;

#[tokio::test]
async fn test_rate_limiter_creation() -> Result<()> {
    let _limiter = RateLimiter::new(10, Duration::from_secs(1), 5);
    let _lookups = RateLimiter::for_directory_lookups(4);

    // Zero values are clamped rather than deadlocking
    let limiter = RateLimiter::new(0, Duration::ZERO, 0);
    timeout(Duration::from_secs(1), limiter.acquire()).await??;

    Ok(())
}

#[tokio::test]
async fn test_bucket_refills_after_period() -> Result<()> {
    let limiter = RateLimiter::new(5, Duration::from_millis(500), 5);

    for _ in 0..5 {
        drop(limiter.acquire().await?);
    }

    // The sixth request must wait for the next period
    let start = Instant::now();
    let _permit = limiter.acquire().await?;
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(400),
        "Did not wait for rate limit: {:?}",
        elapsed
    );

    Ok(())
}

#[tokio::test]
async fn test_concurrency_cap() -> Result<()> {
    let limiter = Arc::new(RateLimiter::new(100, Duration::from_secs(1), 2));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let limiter = Arc::clone(&limiter);
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            let _permit = limiter.acquire().await?;
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            anyhow::Ok(())
        }));
    }

    for handle in handles {
        handle.await??;
    }

    assert!(peak.load(Ordering::SeqCst) <= 2, "more than two permits held at once");
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_permit_released_on_drop() -> Result<()> {
    let limiter = RateLimiter::new(100, Duration::from_secs(1), 1);

    let permit = limiter.acquire().await?;
    // Second acquire blocks while the only slot is held
    assert!(timeout(Duration::from_millis(100), limiter.acquire()).await.is_err());

    drop(permit);
    timeout(Duration::from_millis(500), limiter.acquire()).await??;

    Ok(())
}
