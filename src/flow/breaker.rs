use crate::{
    chain::{
        context::ChainContext,
        step::{step, Step},
    },
    error::{AgentError, Result},
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerOptions {
    /// Failures inside `window` that open the circuit.
    pub failures: usize,
    pub window: Duration,
    /// How long the circuit stays open.
    pub timeout: Duration,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            failures: 5,
            window: Duration::from_millis(10_000),
            timeout: Duration::from_millis(15_000),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    recent_failures: VecDeque<Instant>,
    open_until: Option<Instant>,
}

/// Circuit breaker shared by every step wrapped with it. Clones share state.
#[derive(Debug, Clone)]
pub struct Breaker {
    options: BreakerOptions,
    state: Arc<Mutex<BreakerState>>,
}

impl Default for Breaker {
    fn default() -> Self {
        Self::new(BreakerOptions::default())
    }
}

impl Breaker {
    pub fn new(options: BreakerOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(BreakerState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether calls may pass right now.
    pub fn allow(&self) -> bool {
        match self.lock().open_until {
            Some(until) => Instant::now() > until,
            None => true,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.allow()
    }

    pub fn record(&self, ok: bool) {
        let now = Instant::now();
        let mut state = self.lock();
        let window = self.options.window;
        state
            .recent_failures
            .retain(|failed_at| now.duration_since(*failed_at) < window);
        if !ok {
            state.recent_failures.push_back(now);
        }
        if state.recent_failures.len() >= self.options.failures {
            warn!(
                target: "agentic_tools::chain",
                failures = state.recent_failures.len(),
                open_for_ms = self.options.timeout.as_millis() as u64,
                "circuit opened"
            );
            state.open_until = Some(now + self.options.timeout);
            state.recent_failures.clear();
        }
    }

    /// Run `fut` through the breaker.
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        if !self.allow() {
            return Err(AgentError::CircuitOpen);
        }
        let result = fut.await;
        self.record(result.is_ok());
        result
    }
}

pub fn with_breaker(inner: Step, breaker: Breaker) -> Step {
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let breaker = breaker.clone();
        async move { breaker.call(inner(ctx)).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::memory::Memory, types::outcome::Outcome};

    #[tokio::test(start_paused = true)]
    async fn opens_after_failures_and_recovers() {
        let breaker = Breaker::new(BreakerOptions {
            failures: 2,
            window: Duration::from_secs(5),
            timeout: Duration::from_secs(8),
        });
        let failing = step(|_ctx: ChainContext| async move {
            Err::<Outcome, _>(AgentError::Chat("upstream".into()))
        });
        let guarded = with_breaker(failing, breaker.clone());
        let ctx = ChainContext::new(Memory::new());

        assert!(matches!(guarded(ctx.clone()).await, Err(AgentError::Chat(_))));
        assert!(breaker.allow());
        assert!(matches!(guarded(ctx.clone()).await, Err(AgentError::Chat(_))));
        assert!(breaker.is_open());

        let err = guarded(ctx.clone()).await.unwrap_err();
        assert_eq!(err.error_code(), "CIRCUIT_OPEN");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(breaker.allow());
    }

    #[tokio::test(start_paused = true)]
    async fn old_failures_leave_the_window() {
        let breaker = Breaker::new(BreakerOptions {
            failures: 2,
            window: Duration::from_secs(1),
            timeout: Duration::from_secs(8),
        });
        breaker.record(false);
        tokio::time::advance(Duration::from_secs(2)).await;
        breaker.record(false);
        assert!(breaker.allow());
    }
}
