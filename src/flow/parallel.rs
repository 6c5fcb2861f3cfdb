//! Concurrent composition. Every branch runs in its own
//! [`ChainContext::branch`]: memory is shared, navigation is not.

use crate::{
    chain::{
        context::ChainContext,
        runtime::guarded,
        step::{step, Step},
    },
    error::{AgentError, Result},
    types::outcome::Outcome,
};
use futures::{
    future::{join_all, select_ok, try_join_all, BoxFuture},
    stream::{FuturesUnordered, StreamExt},
};
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelOptions {
    /// Fail on the first error instead of collecting every result.
    pub fail_fast: bool,
    /// Per-branch limit.
    pub timeout: Option<Duration>,
}

impl ParallelOptions {
    pub fn fail_fast() -> Self {
        Self {
            fail_fast: true,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

fn spawn_branches(
    steps: &[Step],
    ctx: &ChainContext,
    timeout: Option<Duration>,
) -> Vec<BoxFuture<'static, Result<Outcome>>> {
    steps
        .iter()
        .map(|branch| -> BoxFuture<'static, Result<Outcome>> {
            let run = branch(ctx.branch());
            Box::pin(guarded(timeout, run))
        })
        .collect()
}

fn settle(result: Result<Outcome>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(err) => Outcome::Error(err.to_string()),
    }
}

/// Run all branches. Results keep input order; without `fail_fast` a
/// failed branch appears as [`Outcome::Error`].
pub fn parallel(steps: Vec<Step>, options: ParallelOptions) -> Step {
    if options.fail_fast {
        return all(steps, options.timeout);
    }
    all_settled(steps, options.timeout)
}

/// All branches must succeed; the first failure fails the step.
pub fn all(steps: Vec<Step>, timeout: Option<Duration>) -> Step {
    let steps = Arc::new(steps);
    step(move |ctx: ChainContext| {
        let branches = spawn_branches(&steps, &ctx, timeout);
        async move { try_join_all(branches).await.map(Outcome::List) }
    })
}

pub fn all_settled(steps: Vec<Step>, timeout: Option<Duration>) -> Step {
    let steps = Arc::new(steps);
    step(move |ctx: ChainContext| {
        let branches = spawn_branches(&steps, &ctx, timeout);
        async move {
            let settled = join_all(branches).await.into_iter().map(settle).collect();
            Ok(Outcome::List(settled))
        }
    })
}

/// The first branch to settle wins, success or failure.
pub fn race(steps: Vec<Step>, timeout: Option<Duration>) -> Step {
    let steps = Arc::new(steps);
    step(move |ctx: ChainContext| {
        let branches = spawn_branches(&steps, &ctx, timeout);
        async move {
            let mut pending: FuturesUnordered<_> = branches.into_iter().collect();
            match pending.next().await {
                Some(result) => result,
                None => Ok(ctx.last()),
            }
        }
    })
}

/// The first branch to succeed wins; fails only when every branch fails.
pub fn any(steps: Vec<Step>, timeout: Option<Duration>) -> Step {
    let steps = Arc::new(steps);
    step(move |ctx: ChainContext| {
        let branches = spawn_branches(&steps, &ctx, timeout);
        let count = branches.len();
        async move {
            if branches.is_empty() {
                return Err(AgentError::AllFailed(Vec::new()));
            }
            let mut pending: FuturesUnordered<_> = branches.into_iter().collect();
            let mut failures = Vec::with_capacity(count);
            while let Some(result) = pending.next().await {
                match result {
                    Ok(outcome) => return Ok(outcome),
                    Err(err) => {
                        debug!(target: "agentic_tools::chain", error = %err, "any: branch failed");
                        failures.push(err);
                    }
                }
            }
            Err(AgentError::AllFailed(failures))
        }
    })
}

/// Start every branch at once and take the first success.
pub fn race_hedge(steps: Vec<Step>, timeout: Option<Duration>) -> Step {
    let steps = Arc::new(steps);
    step(move |ctx: ChainContext| {
        let branches = spawn_branches(&steps, &ctx, timeout);
        async move {
            if branches.is_empty() {
                return Err(AgentError::AllFailed(Vec::new()));
            }
            select_ok(branches).await.map(|(outcome, _rest)| outcome)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::Memory;
    use serde_json::json;

    fn delayed(ms: u64, reply: &'static str) -> Step {
        step(move |_ctx: ChainContext| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(reply)
        })
    }

    fn failing(ms: u64) -> Step {
        step(move |_ctx: ChainContext| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Err::<Outcome, _>(AgentError::ToolExecution(format!("failed after {ms}")))
        })
    }

    fn ctx() -> ChainContext {
        ChainContext::new(Memory::new())
    }

    #[tokio::test(start_paused = true)]
    async fn results_keep_input_order() {
        let outcome = parallel(vec![delayed(30, "slow"), delayed(10, "fast")], ParallelOptions::default())(ctx())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::List(vec![Outcome::from("slow"), Outcome::from("fast")])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn settled_results_carry_failures() {
        let outcome = parallel(
            vec![delayed(5, "ok"), failing(5)],
            ParallelOptions::default(),
        )(ctx())
        .await
        .unwrap();
        let Outcome::List(items) = outcome else {
            panic!("expected a list");
        };
        assert_eq!(items[0], Outcome::from("ok"));
        assert!(items[1].is_error());

        let err = parallel(vec![delayed(5, "ok"), failing(5)], ParallelOptions::fail_fast())(ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolExecution(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn per_branch_timeout_becomes_an_error_entry() {
        let options = ParallelOptions::default().with_timeout(Duration::from_millis(50));
        let outcome = parallel(vec![delayed(10, "a"), delayed(500, "b")], options)(ctx())
            .await
            .unwrap();
        let Outcome::List(items) = outcome else {
            panic!("expected a list");
        };
        assert_eq!(items[0], Outcome::from("a"));
        assert!(matches!(&items[1], Outcome::Error(message) if message.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn race_and_any_pick_winners() {
        let outcome = race(vec![failing(5), delayed(20, "late")], None)(ctx()).await;
        assert!(outcome.is_err());

        let outcome = any(vec![failing(5), delayed(20, "late")], None)(ctx()).await.unwrap();
        assert_eq!(outcome, Outcome::from("late"));

        let outcome = race_hedge(vec![delayed(40, "b"), delayed(10, "a")], None)(ctx())
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::from("a"));

        let err = any(vec![failing(1), failing(2)], None)(ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::AllFailed(ref failures) if failures.len() == 2));
    }

    #[tokio::test]
    async fn branches_share_memory() {
        let writer = step(|ctx: ChainContext| async move {
            ctx.set("seen", json!(true));
            ctx.goto("elsewhere");
            Ok(())
        });
        let ctx = ctx();
        all(vec![writer], None)(ctx.clone()).await.unwrap();
        assert_eq!(ctx.get("seen"), Some(json!(true)));
        assert!(!ctx.has_goto());
    }
}
