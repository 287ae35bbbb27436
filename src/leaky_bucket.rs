//! Time-based admission control for Scheduler → Runner submissions.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct LeakyBucket {
    bucket_size: usize,
    drip_interval: Duration,
    admissions: Mutex<VecDeque<Instant>>,
}

impl LeakyBucket {
    pub fn new(bucket_size: usize, requests_per_minute: f64) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        assert!(requests_per_minute > 0.0, "requests_per_minute must be positive");
        Self {
            bucket_size,
            drip_interval: Duration::from_secs_f64(60.0 / requests_per_minute),
            admissions: Mutex::new(VecDeque::with_capacity(bucket_size)),
        }
    }

    /// Admits one unit of work, sleeping first if the bucket is full, then
    /// runs `critical_section` while still holding the admission slot so a
    /// later caller cannot jump ahead of one that is already being served.
    pub async fn throttle<F, Fut, T>(&self, critical_section: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut admissions = self.admissions.lock().await;

        let now = Instant::now();
        let window = self.drip_interval.saturating_mul(self.bucket_size as u32);
        while matches!(admissions.front(), Some(&oldest) if now.saturating_duration_since(oldest) > window) {
            admissions.pop_front();
        }

        if admissions.len() >= self.bucket_size {
            if let Some(&last) = admissions.back() {
                let next_slot = last + self.drip_interval;
                tokio::time::sleep_until(next_slot).await;
            }
        }

        admissions.push_back(Instant::now());

        critical_section().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_burst_capacity_immediately() {
        let bucket = LeakyBucket::new(3, 60.0);
        let start = Instant::now();
        for _ in 0..3 {
            bucket.throttle(|| async {}).await;
        }
        assert_eq!(Instant::now(), start, "burst admissions should not sleep");
    }

    #[tokio::test(start_paused = true)]
    async fn throttles_admissions_beyond_burst_capacity() {
        // 60 requests/minute => one every second; burst of 1 forces every
        // subsequent admission to wait a full drip interval.
        let bucket = LeakyBucket::new(1, 60.0);
        let start = Instant::now();
        for _ in 0..4 {
            bucket.throttle(|| async {}).await;
        }
        let elapsed = Instant::now() - start;
        // N=4, B=1, R=1/s => elapsed >= (4-1)/1 * 1s = 3s
        assert!(elapsed >= Duration::from_secs(3), "elapsed was {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn admissions_are_fifo_under_concurrency() {
        let bucket = Arc::new(LeakyBucket::new(1, 60.0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let bucket = bucket.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                bucket
                    .throttle(|| async move {
                        order.lock().await.push(i);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().await, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_sleep_releases_the_waiter() {
        let bucket = Arc::new(LeakyBucket::new(1, 60.0));
        bucket.throttle(|| async {}).await;

        let entered = Arc::new(AtomicUsize::new(0));
        let cancelled = {
            let bucket = bucket.clone();
            let entered = entered.clone();
            tokio::spawn(async move {
                bucket
                    .throttle(|| async {
                        entered.fetch_add(1, Ordering::SeqCst);
                    })
                    .await;
            })
        };
        // Abort before the drip interval elapses, while still asleep.
        tokio::task::yield_now().await;
        cancelled.abort();
        let _ = cancelled.await;
        assert_eq!(entered.load(Ordering::SeqCst), 0);

        // A fresh caller should still be able to make progress afterwards.
        tokio::time::advance(Duration::from_secs(2)).await;
        bucket.throttle(|| async {}).await;
    }
}
