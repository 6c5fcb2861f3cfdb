//! Sliding-window rate limiting and call spacing.

use crate::chain::{
    context::ChainContext,
    step::{step, Step},
};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

/// Admits at most `max` acquisitions in any `interval`. Waiters are served
/// in arrival order. Clones share the window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max: usize,
    interval: Duration,
    admitted: Arc<Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max: usize, interval: Duration) -> Self {
        Self {
            max: max.max(1),
            interval,
            admitted: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a slot is free, then take it.
    pub async fn acquire(&self) {
        // The lock is held while waiting so later callers queue behind us.
        let mut admitted = self.admitted.lock().await;
        loop {
            let now = Instant::now();
            while admitted
                .front()
                .is_some_and(|at| now.duration_since(*at) >= self.interval)
            {
                admitted.pop_front();
            }
            if admitted.len() < self.max {
                admitted.push_back(now);
                return;
            }
            let Some(oldest) = admitted.front().copied() else {
                continue;
            };
            let wait = self.interval.saturating_sub(now.duration_since(oldest));
            debug!(target: "agentic_tools::chain", wait_ms = wait.as_millis() as u64, "rate limited");
            tokio::time::sleep(wait).await;
        }
    }
}

pub fn with_rate(inner: Step, limiter: RateLimiter) -> Step {
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let limiter = limiter.clone();
        async move {
            limiter.acquire().await;
            inner(ctx).await
        }
    })
}

/// Keeps consecutive calls at least `spacing` apart.
#[derive(Debug, Clone)]
pub struct Throttle {
    spacing: Duration,
    last: Arc<Mutex<Option<Instant>>>,
}

impl Throttle {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let since = previous.elapsed();
            if since < self.spacing {
                tokio::time::sleep(self.spacing - since).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub fn throttle(inner: Step, throttle: Throttle) -> Step {
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let throttle = throttle.clone();
        async move {
            throttle.acquire().await;
            inner(ctx).await
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_max_per_interval() {
        let limiter = RateLimiter::new(2, Duration::from_secs(1));
        let started = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_are_spread_out() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        let started = Instant::now();
        let waits = futures::future::join_all((0..3).map(|_| {
            let limiter = limiter.clone();
            async move {
                limiter.acquire().await;
                started.elapsed()
            }
        }))
        .await;
        let mut waits = waits;
        waits.sort();
        assert!(waits[2] >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_calls() {
        let throttle = Throttle::new(Duration::from_millis(250));
        let started = Instant::now();
        throttle.acquire().await;
        throttle.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
