//! Retry, fallback and error-absorbing wrappers around steps.

use crate::{
    chain::{
        context::ChainContext,
        step::{step, Step},
    },
    error::{AgentError, Result},
    types::outcome::Outcome,
};
use futures::future::BoxFuture;
use rand::Rng;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// How [`with_retry`] spaces its attempts.
///
/// The first wait is `delay` plus up to `jitter` of random slack; every
/// following wait multiplies `delay` by `backoff` (never below 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retries: usize,
    pub delay: Duration,
    pub backoff: f64,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::ZERO,
            backoff: 1.0,
            jitter: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: usize) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn pause(&self, delay: Duration) -> Duration {
        let jitter = self.jitter.as_millis() as u64;
        if jitter == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..jitter))
    }

    fn grow(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.backoff.max(1.0))
    }
}

/// Retry `inner` up to `policy.retries` extra times; the last error wins.
pub fn with_retry(inner: Step, policy: RetryPolicy) -> Step {
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        async move {
            let mut delay = policy.delay;
            let mut attempt = 0;
            loop {
                match inner(ctx.clone()).await {
                    Ok(outcome) => return Ok(outcome),
                    Err(err) if attempt >= policy.retries || matches!(err, AgentError::Aborted) => {
                        return Err(err)
                    }
                    Err(err) => {
                        attempt += 1;
                        warn!(
                            target: "agentic_tools::chain",
                            attempt,
                            retries = policy.retries,
                            error = %err,
                            "step failed, retrying"
                        );
                        if !delay.is_zero() {
                            tokio::time::sleep(policy.pause(delay)).await;
                        }
                        delay = policy.grow(delay);
                    }
                }
            }
        }
    })
}

/// Repeat `inner` until `accept` likes its outcome, at most `retries` times.
/// Yields [`Outcome::Empty`] when no attempt is accepted.
pub fn retry_until<P>(inner: Step, accept: P, retries: usize, delay: Duration) -> Step
where
    P: Fn(&Outcome, &ChainContext) -> bool + Send + Sync + 'static,
{
    let accept = Arc::new(accept);
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let accept = Arc::clone(&accept);
        async move {
            for attempt in 0..retries {
                let outcome = inner(ctx.clone()).await?;
                if accept(&outcome, &ctx) {
                    return Ok(outcome);
                }
                debug!(target: "agentic_tools::chain", attempt, "outcome rejected");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Ok(Outcome::Empty)
        }
    })
}

/// Try each step in order; the first success wins, otherwise the last error.
pub fn fallback(steps: Vec<Step>) -> Step {
    let steps = Arc::new(steps);
    step(move |ctx: ChainContext| {
        let steps = Arc::clone(&steps);
        async move {
            let mut last_err = None;
            for candidate in steps.iter() {
                match candidate(ctx.clone()).await {
                    Ok(outcome) => return Ok(outcome),
                    Err(err) => {
                        debug!(target: "agentic_tools::chain", error = %err, "fallback candidate failed");
                        last_err = Some(err);
                    }
                }
            }
            match last_err {
                Some(err) => Err(err),
                None => Ok(ctx.last()),
            }
        }
    })
}

type Recover = Arc<dyn Fn(AgentError, ChainContext) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;

/// Hand a failure of `inner` to `recover`, whose result replaces it.
pub fn try_catch<F, Fut, O>(inner: Step, recover: F) -> Step
where
    F: Fn(AgentError, ChainContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
    O: Into<Outcome>,
{
    let recover: Recover = Arc::new(
        move |err: AgentError, ctx: ChainContext| -> BoxFuture<'static, Result<Outcome>> {
            let fut = recover(err, ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        },
    );
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let recover = Arc::clone(&recover);
        async move {
            match inner(ctx.clone()).await {
                Ok(outcome) => Ok(outcome),
                Err(err) => recover(err, ctx).await,
            }
        }
    })
}

/// Swallow any failure of `inner`, leaving [`Outcome::Empty`].
pub fn suppress(inner: Step) -> Step {
    try_catch(inner, |err: AgentError, _ctx: ChainContext| async move {
        debug!(target: "agentic_tools::chain", error = %err, "suppressed");
        Ok(())
    })
}

/// Substitute a computed value when `inner` fails.
pub fn with_fallback_value<F, O>(inner: Step, value: F) -> Step
where
    F: Fn(&ChainContext) -> O + Send + Sync + 'static,
    O: Into<Outcome>,
{
    try_catch(inner, move |_err: AgentError, ctx: ChainContext| {
        let outcome: Outcome = value(&ctx).into();
        async move { Ok(outcome) }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::Memory;
    use serde_json::{json, Value};

    fn ctx() -> ChainContext {
        ChainContext::new(Memory::new())
    }

    /// Fails until it has been called `succeed_on` times.
    fn flaky(succeed_on: i64) -> Step {
        step(move |ctx: ChainContext| async move {
            let calls = ctx
                .memory()
                .update("calls", |current| json!(current.and_then(Value::as_i64).unwrap_or(0) + 1));
            if calls.as_i64() < Some(succeed_on) {
                return Err(AgentError::Chat("flaky".into()));
            }
            Ok(calls)
        })
    }

    fn calls(ctx: &ChainContext) -> i64 {
        ctx.get("calls").and_then(|v| v.as_i64()).unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_within_budget() {
        let ctx = ctx();
        let policy = RetryPolicy::new(3)
            .with_delay(Duration::from_millis(100))
            .with_backoff(2.0)
            .with_jitter(Duration::from_millis(10));
        let outcome = with_retry(flaky(3), policy)(ctx.clone()).await.unwrap();
        assert_eq!(outcome, Outcome::from(json!(3)));
        assert_eq!(calls(&ctx), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_with_the_last_error() {
        let ctx = ctx();
        let err = with_retry(flaky(10), RetryPolicy::new(2))(ctx.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Chat(_)));
        assert_eq!(calls(&ctx), 3);
    }

    #[tokio::test]
    async fn retry_until_stops_on_accept() {
        let ctx = ctx();
        let outcome = retry_until(
            flaky(0),
            |outcome: &Outcome, _ctx: &ChainContext| outcome.as_value() == Some(&json!(2)),
            5,
            Duration::ZERO,
        )(ctx.clone())
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::from(json!(2)));

        let outcome = retry_until(flaky(0), |_o: &Outcome, _c: &ChainContext| false, 2, Duration::ZERO)(ctx)
            .await
            .unwrap();
        assert!(outcome.is_empty());
    }

    #[tokio::test]
    async fn fallbacks_and_catchers() {
        let broken = step(|_ctx: ChainContext| async move { Err::<Outcome, _>(AgentError::Chat("down".into())) });
        let backup = step(|_ctx: ChainContext| async move { Ok("backup") });

        let outcome = fallback(vec![Arc::clone(&broken), backup])(ctx()).await.unwrap();
        assert_eq!(outcome, Outcome::from("backup"));

        let outcome = suppress(Arc::clone(&broken))(ctx()).await.unwrap();
        assert!(outcome.is_empty());

        let outcome = with_fallback_value(Arc::clone(&broken), |_ctx: &ChainContext| "default")(ctx())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::from("default"));

        let outcome = try_catch(broken, |err: AgentError, _ctx: ChainContext| async move {
            Ok(format!("caught: {}", err.error_code()))
        })(ctx())
        .await
        .unwrap();
        assert_eq!(outcome.as_text(), Some("caught: CHAT_ERROR"));
    }
}
