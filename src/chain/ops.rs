//! Fluent operators. Each method appends one step built by [`crate::flow`].

use super::{
    context::{ChainContext, NextOptions},
    runtime::Chain,
    step::{Prompt, Step},
};
use crate::{
    core::assistant::{ChatOptions, ChoiceOptions},
    error::{AgentError, Result},
    flow::{
        breaker::{self, Breaker},
        bulkhead::{self, Bulkhead, WorkQueue},
        chat, control,
        control::MatchCase,
        memo,
        memory_ops::{self, Source},
        parallel::{self, ParallelOptions},
        rate_limit::{self, RateLimiter, Throttle},
        resilience::{self, RetryPolicy},
    },
    types::outcome::Outcome,
};
use serde_json::Value;
use std::{future::Future, time::Duration};

pub trait ChainOps: Sized {
    /// Append a step.
    fn push_step(self, step: Step) -> Self;

    fn goto(self, state: impl Into<String>) -> Self {
        self.push_step(control::goto(state))
    }

    fn next(self, state: impl Into<String>, options: NextOptions) -> Self {
        self.push_step(control::next(state, options))
    }

    fn when<P>(self, predicate: P, then: Step, otherwise: Option<Step>) -> Self
    where
        P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
    {
        self.push_step(control::when(predicate, then, otherwise))
    }

    fn switch_case<S>(self, selector: S, cases: Vec<(String, Step)>, default: Option<Step>) -> Self
    where
        S: Fn(&ChainContext) -> String + Send + Sync + 'static,
    {
        self.push_step(control::switch_case(selector, cases, default))
    }

    fn match_cases<S>(self, value: S, cases: Vec<MatchCase>, default: Option<Step>) -> Self
    where
        S: Fn(&ChainContext) -> Value + Send + Sync + 'static,
    {
        self.push_step(control::match_cases(value, cases, default))
    }

    fn while_loop<P>(self, predicate: P, body: Step, max: Option<usize>) -> Self
    where
        P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
    {
        self.push_step(control::while_loop(predicate, body, max))
    }

    fn for_each<I>(self, items: I, body: Step) -> Self
    where
        I: Fn(&ChainContext) -> Vec<Value> + Send + Sync + 'static,
    {
        self.push_step(control::for_each(items, body))
    }

    fn do_while<P>(self, body: Step, predicate: P) -> Self
    where
        P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
    {
        self.push_step(control::do_while(body, predicate))
    }

    fn until<P>(self, predicate: P, body: Step) -> Self
    where
        P: Fn(&ChainContext) -> bool + Send + Sync + 'static,
    {
        self.push_step(control::until(predicate, body))
    }

    fn sleep(self, duration: Duration) -> Self {
        self.push_step(control::sleep(duration))
    }

    fn with_timeout(self, body: Step, limit: Duration) -> Self {
        self.push_step(control::with_timeout(body, limit))
    }

    fn log(self, label: impl Into<String>) -> Self {
        self.push_step(control::log(label))
    }

    fn label(self, label: impl Into<String>) -> Self {
        self.push_step(control::label(label))
    }

    fn print(self) -> Self {
        self.push_step(control::print(None))
    }

    fn tap<F>(self, observe: F) -> Self
    where
        F: Fn(&Outcome, &ChainContext) + Send + Sync + 'static,
    {
        self.push_step(control::tap(observe))
    }

    fn measure(self, body: Step) -> Self {
        self.push_step(control::measure(body))
    }

    fn then<F, O>(self, transform: F) -> Self
    where
        F: Fn(Outcome, &ChainContext) -> O + Send + Sync + 'static,
        O: Into<Outcome>,
    {
        self.push_step(control::then(transform))
    }

    fn pipe(self, steps: Vec<Step>) -> Self {
        self.push_step(control::pipe(steps))
    }

    fn noop(self) -> Self {
        self.push_step(control::noop())
    }

    fn parallel(self, steps: Vec<Step>, options: ParallelOptions) -> Self {
        self.push_step(parallel::parallel(steps, options))
    }

    fn race(self, steps: Vec<Step>, timeout: Option<Duration>) -> Self {
        self.push_step(parallel::race(steps, timeout))
    }

    fn race_hedge(self, steps: Vec<Step>, timeout: Option<Duration>) -> Self {
        self.push_step(parallel::race_hedge(steps, timeout))
    }

    fn all(self, steps: Vec<Step>, timeout: Option<Duration>) -> Self {
        self.push_step(parallel::all(steps, timeout))
    }

    fn all_settled(self, steps: Vec<Step>, timeout: Option<Duration>) -> Self {
        self.push_step(parallel::all_settled(steps, timeout))
    }

    fn any(self, steps: Vec<Step>, timeout: Option<Duration>) -> Self {
        self.push_step(parallel::any(steps, timeout))
    }

    fn fallback(self, steps: Vec<Step>) -> Self {
        self.push_step(resilience::fallback(steps))
    }

    fn with_retry(self, body: Step, policy: RetryPolicy) -> Self {
        self.push_step(resilience::with_retry(body, policy))
    }

    fn retry_until<P>(self, body: Step, accept: P, retries: usize, delay: Duration) -> Self
    where
        P: Fn(&Outcome, &ChainContext) -> bool + Send + Sync + 'static,
    {
        self.push_step(resilience::retry_until(body, accept, retries, delay))
    }

    fn try_catch<F, Fut, O>(self, body: Step, recover: F) -> Self
    where
        F: Fn(AgentError, ChainContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<Outcome>,
    {
        self.push_step(resilience::try_catch(body, recover))
    }

    fn suppress(self, body: Step) -> Self {
        self.push_step(resilience::suppress(body))
    }

    fn with_fallback_value<F, O>(self, body: Step, value: F) -> Self
    where
        F: Fn(&ChainContext) -> O + Send + Sync + 'static,
        O: Into<Outcome>,
    {
        self.push_step(resilience::with_fallback_value(body, value))
    }

    fn with_bulkhead(self, body: Step, bulkhead: Bulkhead) -> Self {
        self.push_step(bulkhead::with_bulkhead(body, bulkhead))
    }

    fn with_queue(self, body: Step, queue: WorkQueue) -> Self {
        self.push_step(bulkhead::with_queue(body, queue))
    }

    fn with_breaker(self, body: Step, breaker: Breaker) -> Self {
        self.push_step(breaker::with_breaker(body, breaker))
    }

    fn with_rate(self, body: Step, limiter: RateLimiter) -> Self {
        self.push_step(rate_limit::with_rate(body, limiter))
    }

    fn throttle(self, body: Step, throttle: Throttle) -> Self {
        self.push_step(rate_limit::throttle(body, throttle))
    }

    fn memo<K>(self, body: Step, key: K) -> Self
    where
        K: Fn(&ChainContext) -> String + Send + Sync + 'static,
    {
        self.push_step(memo::memo(body, key))
    }

    fn set(self, key: impl Into<String>, value: impl Into<Source>) -> Self {
        self.push_step(memory_ops::set(key, value))
    }

    fn get(self, key: impl Into<String>) -> Self {
        self.push_step(memory_ops::get(key, None))
    }

    fn get_or(self, key: impl Into<String>, or_else: impl Into<Source>) -> Self {
        self.push_step(memory_ops::get(key, Some(or_else.into())))
    }

    fn def(self, key: impl Into<String>, value: impl Into<Source>) -> Self {
        self.push_step(memory_ops::def(key, value))
    }

    fn update<F>(self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<&Value>, &ChainContext) -> Value + Send + Sync + 'static,
    {
        self.push_step(memory_ops::update(key, f))
    }

    fn del(self, key: impl Into<String>) -> Self {
        self.push_step(memory_ops::del(key))
    }

    fn clear(self) -> Self {
        self.push_step(memory_ops::clear())
    }

    fn merge(self, key: impl Into<String>, value: impl Into<Source>) -> Self {
        self.push_step(memory_ops::merge(key, value))
    }

    fn push(self, key: impl Into<String>, value: impl Into<Source>) -> Self {
        self.push_step(memory_ops::push(key, value))
    }

    fn pop(self, key: impl Into<String>) -> Self {
        self.push_step(memory_ops::pop(key))
    }

    fn inc(self, key: impl Into<String>, by: impl Into<Source>) -> Self {
        self.push_step(memory_ops::inc(key, by))
    }

    fn dec(self, key: impl Into<String>, by: impl Into<Source>) -> Self {
        self.push_step(memory_ops::dec(key, by))
    }

    fn toggle(self, key: impl Into<String>) -> Self {
        self.push_step(memory_ops::toggle(key))
    }

    fn copy(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.push_step(memory_ops::copy(from, to))
    }

    fn move_key(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.push_step(memory_ops::move_key(from, to))
    }

    fn set_last(self, key: impl Into<String>) -> Self {
        self.push_step(memory_ops::set_last(key))
    }

    fn set_path(self, path: impl Into<String>, value: impl Into<Source>) -> Self {
        self.push_step(memory_ops::set_path(path, value))
    }

    fn get_path(self, path: impl Into<String>) -> Self {
        self.push_step(memory_ops::get_path(path, None))
    }

    fn del_path(self, path: impl Into<String>) -> Self {
        self.push_step(memory_ops::del_path(path))
    }

    fn chat(self, prompt: impl Into<Prompt>) -> Self {
        self.push_step(chat::chat(prompt, ChatOptions::new()))
    }

    fn chat_with(self, prompt: impl Into<Prompt>, options: ChatOptions) -> Self {
        self.push_step(chat::chat(prompt, options))
    }

    fn solo(self, prompt: impl Into<Prompt>) -> Self {
        self.push_step(chat::solo(prompt, ChatOptions::new()))
    }

    fn discuss(self, prompt: impl Into<Prompt>) -> Self {
        self.push_step(chat::discuss(prompt, ChatOptions::new()))
    }

    fn decide(self, prompt: impl Into<Prompt>, options: ChatOptions) -> Self {
        self.push_step(chat::decide(prompt, options))
    }

    fn answer(self, prompt: impl Into<Prompt>) -> Self {
        self.push_step(chat::answer(prompt, ChoiceOptions::default()))
    }

    fn choose(self, prompt: impl Into<Prompt>, options: ChoiceOptions) -> Self {
        self.push_step(chat::choose(prompt, options))
    }

    fn yes_or_no(self, prompt: impl Into<Prompt>) -> Self {
        self.push_step(chat::yes_or_no(prompt, ChoiceOptions::default()))
    }
}

impl ChainOps for Chain {
    fn push_step(self, step: Step) -> Self {
        self.then_step(step)
    }
}

/// A sequence of steps run in the caller's context, for operator bodies.
#[derive(Clone, Default)]
pub struct Steps {
    steps: Vec<Step>,
}

impl Steps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn build(self) -> Step {
        control::pipe(self.steps)
    }
}

impl ChainOps for Steps {
    fn push_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// Build an operator body fluently.
///
/// ```
/// use agentic_tools::chain::{seq, ChainOps};
///
/// let body = seq(|s| s.inc("count", 1).log("tick"));
/// # let _ = body;
/// ```
pub fn seq(build: impl FnOnce(Steps) -> Steps) -> Step {
    build(Steps::new()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::runtime::Chain,
        config::RunOptions,
        core::{assistant::ChatAssistant, capability::ChatResponse, scripted::ScriptedChat},
    };
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn fluent_memory_and_control() {
        let chain = Chain::new()
            .set("tasks", json!(["a", "b", "c"]))
            .while_loop(
                |ctx: &ChainContext| {
                    ctx.get("tasks")
                        .and_then(|tasks| tasks.as_array().map(|items| !items.is_empty()))
                        .unwrap_or(false)
                },
                seq(|s| s.pop("tasks").set_last("current").inc("done", 1)),
                None,
            )
            .get("done");

        let outcome = chain.run(None, RunOptions::new()).await.unwrap();
        assert_eq!(outcome, Outcome::from(json!(3)));
        assert_eq!(chain.memory().get("current"), Some(json!("a")));
    }

    #[tokio::test]
    async fn gotos_inside_bodies_steer_the_run() {
        let chain = Chain::new()
            .set("score", 7)
            .when(
                |ctx: &ChainContext| ctx.get("score").and_then(|v| v.as_i64()).unwrap_or(0) > 5,
                seq(|s| s.goto("win")),
                Some(seq(|s| s.goto("lose"))),
            )
            .state("win", |ctx: ChainContext| async move {
                ctx.set_last("You win!");
                Ok(())
            })
            .state("lose", |ctx: ChainContext| async move {
                ctx.set_last("You lose!");
                Ok(())
            });

        let outcome = chain.run(None, RunOptions::new()).await.unwrap();
        assert_eq!(outcome.as_text(), Some("You win!"));
    }

    #[tokio::test]
    async fn chat_then_transform() {
        let script = ScriptedChat::new().reply(ChatResponse::text("hello"));
        let chain = Chain::with_assistant(Arc::new(ChatAssistant::new(script)))
            .chat("Say hello")
            .then(|last: Outcome, _ctx: &ChainContext| format!("{last} world"));
        let outcome = chain.run(None, RunOptions::new()).await.unwrap();
        assert_eq!(outcome.as_text(), Some("hello world"));
    }
}
