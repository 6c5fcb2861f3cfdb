//! Navigation, branching, loops, timing, logging and transformation steps.

use crate::{
    chain::{
        context::{ChainContext, NextOptions},
        runtime::guarded,
        step::{step, Step},
    },
    error::{AgentError, Result},
    types::outcome::Outcome,
};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::info;

/// Memory key holding the duration of the last [`measure`]d step.
pub const LAST_DURATION_KEY: &str = "__last_duration_ms";

pub type Predicate = Arc<dyn Fn(&ChainContext) -> bool + Send + Sync>;

type ValueMatcher = Arc<dyn Fn(&ChainContext, &Value) -> bool + Send + Sync>;

/// One arm of [`match_cases`].
#[derive(Clone)]
pub struct MatchCase {
    matches: ValueMatcher,
    step: Step,
}

pub fn case<F>(matches: F, step: Step) -> MatchCase
where
    F: Fn(&ChainContext, &Value) -> bool + Send + Sync + 'static,
{
    MatchCase {
        matches: Arc::new(matches),
        step,
    }
}

fn check_signal(ctx: &ChainContext) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(AgentError::Aborted);
    }
    Ok(())
}

async fn run_into(step: &Step, ctx: &ChainContext) -> Result<Outcome> {
    let outcome = step(ctx.clone()).await?;
    ctx.set_last(outcome.clone());
    Ok(outcome)
}

pub fn noop() -> Step {
    step(|ctx: ChainContext| async move { Ok(ctx.last()) })
}

pub fn goto(state: impl Into<String>) -> Step {
    let state = state.into();
    step(move |ctx: ChainContext| {
        ctx.goto(state.clone());
        async move { Ok(ctx.last()) }
    })
}

pub fn next(state: impl Into<String>, options: NextOptions) -> Step {
    let state = state.into();
    step(move |ctx: ChainContext| {
        ctx.next(state.clone(), options.clone());
        async move { Ok(ctx.last()) }
    })
}

/// Run `then` when the predicate holds, `otherwise` (if any) when it does not.
pub fn when<P>(predicate: P, then: Step, otherwise: Option<Step>) -> Step
where
    P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
{
    step(move |ctx: ChainContext| {
        let branch = if predicate(&ctx) {
            Some(Arc::clone(&then))
        } else {
            otherwise.clone()
        };
        async move {
            match branch {
                Some(branch) => branch(ctx).await,
                None => Ok(ctx.last()),
            }
        }
    })
}

pub fn switch_case<S>(selector: S, cases: Vec<(String, Step)>, default: Option<Step>) -> Step
where
    S: Fn(&ChainContext) -> String + Send + Sync + 'static,
{
    step(move |ctx: ChainContext| {
        let key = selector(&ctx);
        let branch = cases
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, step)| Arc::clone(step))
            .or_else(|| default.clone());
        async move {
            match branch {
                Some(branch) => branch(ctx).await,
                None => Ok(ctx.last()),
            }
        }
    })
}

/// Run the first case whose matcher accepts the selected value.
pub fn match_cases<S>(value: S, cases: Vec<MatchCase>, default: Option<Step>) -> Step
where
    S: Fn(&ChainContext) -> Value + Send + Sync + 'static,
{
    step(move |ctx: ChainContext| {
        let selected = value(&ctx);
        let branch = cases
            .iter()
            .find(|case| (case.matches)(&ctx, &selected))
            .map(|case| Arc::clone(&case.step))
            .or_else(|| default.clone());
        async move {
            match branch {
                Some(branch) => branch(ctx).await,
                None => Ok(ctx.last()),
            }
        }
    })
}

/// Repeat `body` while the predicate holds, at most `max` times when set.
pub fn while_loop<P>(predicate: P, body: Step, max: Option<usize>) -> Step
where
    P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
{
    let predicate: Predicate = Arc::new(predicate);
    step(move |ctx: ChainContext| {
        let predicate = Arc::clone(&predicate);
        let body = Arc::clone(&body);
        async move {
            let mut iterations = 0usize;
            while predicate(&ctx) {
                iterations += 1;
                if max.is_some_and(|max| iterations > max) {
                    break;
                }
                check_signal(&ctx)?;
                run_into(&body, &ctx).await?;
            }
            Ok(ctx.last())
        }
    })
}

/// Run `body` once per item, each in a branch context exposing
/// [`ChainContext::item`]. The outcomes are collected in order.
pub fn for_each<I>(items: I, body: Step) -> Step
where
    I: Fn(&ChainContext) -> Vec<Value> + Send + Sync + 'static,
{
    step(move |ctx: ChainContext| {
        let items = items(&ctx);
        let body = Arc::clone(&body);
        async move {
            let mut outcomes = Vec::with_capacity(items.len());
            for item in items {
                check_signal(&ctx)?;
                outcomes.push(body(ctx.with_item(item)).await?);
            }
            Ok(Outcome::List(outcomes))
        }
    })
}

pub fn do_while<P>(body: Step, predicate: P) -> Step
where
    P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
{
    let predicate: Predicate = Arc::new(predicate);
    step(move |ctx: ChainContext| {
        let predicate = Arc::clone(&predicate);
        let body = Arc::clone(&body);
        async move {
            loop {
                check_signal(&ctx)?;
                run_into(&body, &ctx).await?;
                if !predicate(&ctx) {
                    break;
                }
            }
            Ok(ctx.last())
        }
    })
}

pub fn until<P>(predicate: P, body: Step) -> Step
where
    P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
{
    let predicate: Predicate = Arc::new(predicate);
    step(move |ctx: ChainContext| {
        let predicate = Arc::clone(&predicate);
        let body = Arc::clone(&body);
        async move {
            while !predicate(&ctx) {
                check_signal(&ctx)?;
                run_into(&body, &ctx).await?;
            }
            Ok(ctx.last())
        }
    })
}

pub fn sleep(duration: Duration) -> Step {
    step(move |ctx: ChainContext| async move {
        tokio::time::sleep(duration).await;
        Ok(ctx.last())
    })
}

pub fn with_timeout(inner: Step, limit: Duration) -> Step {
    step(move |ctx: ChainContext| guarded(Some(limit), inner(ctx)))
}

/// Emit the label, `last` and memory as a tracing event.
pub fn log(label: impl Into<String>) -> Step {
    let label = label.into();
    step(move |ctx: ChainContext| {
        let last = ctx.last();
        info!(
            target: "agentic_tools::chain",
            label = %label,
            last = %last.to_json(),
            memory = %serde_json::Value::Object(ctx.memory().snapshot()),
            "log"
        );
        async move { Ok(last) }
    })
}

/// Tag `last` with a label.
pub fn label(label: impl Into<String>) -> Step {
    let label = label.into();
    step(move |ctx: ChainContext| {
        let labeled = Outcome::labeled(label.clone(), ctx.last());
        async move { Ok(labeled) }
    })
}

pub fn print(label: Option<String>) -> Step {
    step(move |ctx: ChainContext| {
        let last = ctx.last();
        match &label {
            Some(label) => info!(target: "agentic_tools::chain", label = %label, "{}", last),
            None => info!(target: "agentic_tools::chain", "{}", last),
        }
        async move { Ok(last) }
    })
}

/// Observe `last` without changing it.
pub fn tap<F>(observe: F) -> Step
where
    F: Fn(&Outcome, &ChainContext) + Send + Sync + 'static,
{
    step(move |ctx: ChainContext| {
        let last = ctx.last();
        observe(&last, &ctx);
        async move { Ok(last) }
    })
}

/// Run `inner` and record its wall time under [`LAST_DURATION_KEY`].
pub fn measure(inner: Step) -> Step {
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        async move {
            let started = Instant::now();
            let outcome = inner(ctx.clone()).await?;
            let elapsed = started.elapsed().as_millis() as u64;
            ctx.set(LAST_DURATION_KEY, elapsed);
            Ok(outcome)
        }
    })
}

/// Transform `last`.
pub fn then<F, O>(transform: F) -> Step
where
    F: Fn(Outcome, &ChainContext) -> O + Send + Sync + 'static,
    O: Into<Outcome>,
{
    step(move |ctx: ChainContext| {
        let outcome = transform(ctx.last(), &ctx).into();
        async move { Ok(outcome) }
    })
}

/// Run steps in order; each result becomes `last` for the next.
pub fn pipe(steps: Vec<Step>) -> Step {
    let steps = Arc::new(steps);
    step(move |ctx: ChainContext| {
        let steps = Arc::clone(&steps);
        async move {
            for inner in steps.iter() {
                run_into(inner, &ctx).await?;
            }
            Ok(ctx.last())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::Memory;
    use serde_json::json;

    fn ctx() -> ChainContext {
        ChainContext::new(Memory::new())
    }

    fn counter() -> Step {
        step(|ctx: ChainContext| async move {
            let count = ctx.memory().update("count", |current| {
                json!(current.and_then(Value::as_i64).unwrap_or(0) + 1)
            });
            Ok(count)
        })
    }

    fn count(ctx: &ChainContext) -> i64 {
        ctx.get("count").and_then(|value| value.as_i64()).unwrap_or(0)
    }

    #[tokio::test]
    async fn loops_respect_their_bounds() {
        let ctx = ctx();
        while_loop(|_ctx: &ChainContext| true, counter(), Some(3))(ctx.clone())
            .await
            .unwrap();
        assert_eq!(count(&ctx), 3);

        until(|ctx: &ChainContext| count(ctx) >= 5, counter())(ctx.clone())
            .await
            .unwrap();
        assert_eq!(count(&ctx), 5);

        let last = do_while(counter(), |_ctx: &ChainContext| false)(ctx.clone())
            .await
            .unwrap();
        assert_eq!(last, Outcome::from(json!(6)));
    }

    #[tokio::test]
    async fn branching_picks_one_arm() {
        let ctx = ctx();
        ctx.set("score", 7);
        let high = step(|_ctx: ChainContext| async move { Ok("win") });
        let low = step(|_ctx: ChainContext| async move { Ok("lose") });

        let outcome = when(
            |ctx: &ChainContext| ctx.get("score").and_then(|v| v.as_i64()).unwrap_or(0) > 5,
            Arc::clone(&high),
            Some(Arc::clone(&low)),
        )(ctx.clone())
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::from("win"));

        let outcome = switch_case(
            |_ctx: &ChainContext| "b".to_string(),
            vec![("a".to_string(), Arc::clone(&high)), ("b".to_string(), Arc::clone(&low))],
            None,
        )(ctx.clone())
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::from("lose"));

        let outcome = match_cases(
            |ctx: &ChainContext| ctx.get("score").unwrap_or(Value::Null),
            vec![
                case(|_ctx, value| value.as_i64() == Some(1), Arc::clone(&low)),
                case(|_ctx, value| value.as_i64() == Some(7), Arc::clone(&high)),
            ],
            None,
        )(ctx.clone())
        .await
        .unwrap();
        assert_eq!(outcome, Outcome::from("win"));
    }

    #[tokio::test]
    async fn for_each_exposes_items() {
        let body = step(|ctx: ChainContext| async move {
            let item = ctx.item().and_then(Value::as_i64).unwrap_or_default();
            Ok(json!(item * 10))
        });
        let outcome = for_each(|_ctx: &ChainContext| vec![json!(1), json!(2)], body)(ctx())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::List(vec![Outcome::from(json!(10)), Outcome::from(json!(20))])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timing_operators() {
        let ctx = ctx();
        let slow = step(|_ctx: ChainContext| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok("late")
        });
        let err = with_timeout(Arc::clone(&slow), Duration::from_millis(500))(ctx.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));

        measure(slow)(ctx.clone()).await.unwrap();
        let elapsed = ctx.get(LAST_DURATION_KEY).and_then(|v| v.as_u64()).unwrap();
        assert!(elapsed >= 2000);
    }

    #[tokio::test]
    async fn transformations_chain_through_last() {
        let ctx = ctx();
        ctx.set_last("hello");
        let shout = then(|last: Outcome, _ctx: &ChainContext| format!("{last}!"));
        let outcome = pipe(vec![Arc::clone(&shout), shout])(ctx.clone()).await.unwrap();
        assert_eq!(outcome, Outcome::from("hello!!"));

        let labeled = label("greeting")(ctx.clone()).await.unwrap();
        assert_eq!(labeled.as_text(), Some("hello!!"));
        assert!(matches!(labeled, Outcome::Labeled { .. }));
    }
}
