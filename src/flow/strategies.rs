//! Agent loops installed as named states on a chain.
//!
//! Each strategy registers `<name>:<phase>` states and keeps its working
//! values in memory under `<name>.<key>`. Run it from [`Paoa::entry`] and
//! friends. Chat outcomes are stored in their JSON form; [`text_of`] reads
//! the reply text back out.

use crate::{
    chain::{
        context::ChainContext,
        runtime::Chain,
        step::state_fn,
    },
    error::Result,
    types::outcome::Outcome,
};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::{fmt, future::Future, sync::Arc};

/// One phase of a strategy: receives the phase input, yields an outcome.
pub type Phase = Arc<dyn Fn(ChainContext, Value) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;

/// A stop condition evaluated on a phase result.
pub type Check = Arc<dyn Fn(ChainContext, Value) -> BoxFuture<'static, Result<bool>> + Send + Sync>;

pub fn phase<F, Fut, O>(f: F) -> Phase
where
    F: Fn(ChainContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
    O: Into<Outcome>,
{
    Arc::new(move |ctx: ChainContext, input: Value| -> BoxFuture<'static, Result<Outcome>> {
        let fut = f(ctx, input);
        Box::pin(async move { fut.await.map(Into::into) })
    })
}

pub fn check<F, Fut>(f: F) -> Check
where
    F: Fn(ChainContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<bool>> + Send + 'static,
{
    Arc::new(move |ctx: ChainContext, input: Value| -> BoxFuture<'static, Result<bool>> {
        Box::pin(f(ctx, input))
    })
}

/// Reply text of a stored chat outcome, or the string itself.
pub fn text_of(value: &Value) -> &str {
    match value {
        Value::String(text) => text,
        Value::Object(map) => map.get("text").and_then(Value::as_str).unwrap_or_default(),
        _ => "",
    }
}

fn bump(ctx: &ChainContext, key: &str) -> u64 {
    ctx.memory()
        .update(key, |current| json!(current.and_then(Value::as_u64).unwrap_or(0) + 1))
        .as_u64()
        .unwrap_or(0)
}

async fn passes(check: &Option<Check>, ctx: &ChainContext, input: Value) -> Result<bool> {
    match check {
        Some(check) => check(ctx.clone(), input).await,
        None => Ok(false),
    }
}

/// Plan, act, observe, adapt until `goal` holds or `max` rounds pass.
#[derive(Clone)]
pub struct Paoa {
    pub plan: Phase,
    pub act: Phase,
    pub observe: Phase,
    pub adapt: Phase,
    pub goal: Option<Check>,
    pub name: String,
    pub max: usize,
}

impl Paoa {
    pub fn new(plan: Phase, act: Phase, observe: Phase, adapt: Phase) -> Self {
        Self {
            plan,
            act,
            observe,
            adapt,
            goal: None,
            name: "paoa".to_string(),
            max: 10,
        }
    }

    pub fn with_goal(mut self, goal: Check) -> Self {
        self.goal = Some(goal);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    pub fn entry(&self) -> String {
        format!("{}:plan", self.name)
    }

    fn state(&self, phase: &str) -> String {
        format!("{}:{phase}", self.name)
    }

    fn key(&self, key: &str) -> String {
        format!("{}.{key}", self.name)
    }
}

impl fmt::Debug for Paoa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Paoa")
            .field("name", &self.name)
            .field("max", &self.max)
            .field("goal", &self.goal.is_some())
            .finish()
    }
}

/// Think, act, observe until `done` holds or `max` rounds pass.
#[derive(Clone)]
pub struct ReactLoop {
    pub think: Phase,
    pub act: Phase,
    pub observe: Phase,
    pub done: Option<Check>,
    pub name: String,
    pub max: usize,
}

impl ReactLoop {
    pub fn new(think: Phase, act: Phase, observe: Phase) -> Self {
        Self {
            think,
            act,
            observe,
            done: None,
            name: "react".to_string(),
            max: 8,
        }
    }

    pub fn with_done(mut self, done: Check) -> Self {
        self.done = Some(done);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    pub fn entry(&self) -> String {
        format!("{}:think", self.name)
    }

    fn state(&self, phase: &str) -> String {
        format!("{}:{phase}", self.name)
    }

    fn key(&self, key: &str) -> String {
        format!("{}.{key}", self.name)
    }
}

impl fmt::Debug for ReactLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactLoop")
            .field("name", &self.name)
            .field("max", &self.max)
            .field("done", &self.done.is_some())
            .finish()
    }
}

/// Draft, then critique and revise for up to `rounds` rounds.
#[derive(Clone)]
pub struct Reflexion {
    pub draft: Phase,
    pub critique: Phase,
    /// Receives `{ "draft": .., "critique": .. }`.
    pub revise: Phase,
    pub accept: Option<Check>,
    pub name: String,
    pub rounds: usize,
}

impl Reflexion {
    pub fn new(draft: Phase, critique: Phase, revise: Phase) -> Self {
        Self {
            draft,
            critique,
            revise,
            accept: None,
            name: "refl".to_string(),
            rounds: 2,
        }
    }

    pub fn with_accept(mut self, accept: Check) -> Self {
        self.accept = Some(accept);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn entry(&self) -> String {
        format!("{}:draft", self.name)
    }

    fn state(&self, phase: &str) -> String {
        format!("{}:{phase}", self.name)
    }

    fn key(&self, key: &str) -> String {
        format!("{}.{key}", self.name)
    }
}

impl fmt::Debug for Reflexion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflexion")
            .field("name", &self.name)
            .field("rounds", &self.rounds)
            .field("accept", &self.accept.is_some())
            .finish()
    }
}

impl Chain {
    pub fn paoa(self, strategy: Paoa) -> Chain {
        let s = Arc::new(strategy);

        let plan = Arc::clone(&s);
        let act = Arc::clone(&s);
        let observe = Arc::clone(&s);
        let adapt = Arc::clone(&s);
        let done = Arc::clone(&s);

        self.with_state(
            s.state("plan"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&plan);
                async move {
                    let plan = (s.plan)(ctx.clone(), Value::Null).await?;
                    ctx.set(s.key("plan"), plan.to_json());
                    Ok(s.state("act"))
                }
            }),
        )
        .with_state(
            s.state("act"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&act);
                async move {
                    let plan = ctx.get(&s.key("plan")).unwrap_or(Value::Null);
                    ctx.set_last((s.act)(ctx.clone(), plan).await?);
                    Ok(s.state("observe"))
                }
            }),
        )
        .with_state(
            s.state("observe"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&observe);
                async move {
                    let observation = (s.observe)(ctx.clone(), Value::Null).await?.to_json();
                    ctx.set(s.key("obs"), observation.clone());
                    let reached = passes(&s.goal, &ctx, observation).await?;
                    Ok(s.state(if reached { "done" } else { "adapt" }))
                }
            }),
        )
        .with_state(
            s.state("adapt"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&adapt);
                async move {
                    let observation = ctx.get(&s.key("obs")).unwrap_or(Value::Null);
                    (s.adapt)(ctx.clone(), observation).await?;
                    let round = bump(&ctx, &s.key("i"));
                    Ok(s.state(if round as usize >= s.max { "done" } else { "plan" }))
                }
            }),
        )
        .with_state(
            s.state("done"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&done);
                async move {
                    ctx.set_last(ctx.get(&s.key("obs")).unwrap_or(Value::Null));
                    Ok(())
                }
            }),
        )
    }

    /// A single plan, act, observe, adapt pass; the adapt result is final.
    pub fn paoa_once(self, strategy: Paoa) -> Chain {
        let s = Arc::new(strategy);

        let plan = Arc::clone(&s);
        let act = Arc::clone(&s);
        let observe = Arc::clone(&s);
        let adapt = Arc::clone(&s);

        self.with_state(
            s.state("plan"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&plan);
                async move {
                    let plan = (s.plan)(ctx.clone(), Value::Null).await?;
                    ctx.set(s.key("plan"), plan.to_json());
                    Ok(s.state("act"))
                }
            }),
        )
        .with_state(
            s.state("act"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&act);
                async move {
                    let plan = ctx.get(&s.key("plan")).unwrap_or(Value::Null);
                    ctx.set_last((s.act)(ctx.clone(), plan).await?);
                    Ok(s.state("observe"))
                }
            }),
        )
        .with_state(
            s.state("observe"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&observe);
                async move {
                    let observation = (s.observe)(ctx.clone(), Value::Null).await?;
                    ctx.set(s.key("obs"), observation.to_json());
                    Ok(s.state("adapt"))
                }
            }),
        )
        .with_state(
            s.state("adapt"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&adapt);
                async move {
                    let observation = ctx.get(&s.key("obs")).unwrap_or(Value::Null);
                    ctx.set_last((s.adapt)(ctx.clone(), observation).await?);
                    Ok(())
                }
            }),
        )
    }

    pub fn react_loop(self, strategy: ReactLoop) -> Chain {
        let s = Arc::new(strategy);

        let think = Arc::clone(&s);
        let act = Arc::clone(&s);
        let observe = Arc::clone(&s);

        self.with_state(
            s.state("think"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&think);
                async move {
                    ctx.set_last((s.think)(ctx.clone(), Value::Null).await?);
                    Ok(s.state("act"))
                }
            }),
        )
        .with_state(
            s.state("act"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&act);
                async move {
                    let thought = ctx.last().to_json();
                    ctx.set_last((s.act)(ctx.clone(), thought).await?);
                    Ok(s.state("observe"))
                }
            }),
        )
        .with_state(
            s.state("observe"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&observe);
                async move {
                    let action = ctx.last().to_json();
                    let observation = (s.observe)(ctx.clone(), action).await?;
                    ctx.set_last(observation.clone());
                    let round = bump(&ctx, &s.key("i"));
                    let finished =
                        passes(&s.done, &ctx, observation.to_json()).await? || round as usize >= s.max;
                    Ok(s.state(if finished { "done" } else { "think" }))
                }
            }),
        )
        .with_state(
            s.state("done"),
            state_fn(|_ctx: ChainContext| async move { Ok(()) }),
        )
    }

    pub fn reflexion(self, strategy: Reflexion) -> Chain {
        let s = Arc::new(strategy);

        let draft = Arc::clone(&s);
        let critique = Arc::clone(&s);
        let revise = Arc::clone(&s);
        let done = Arc::clone(&s);

        self.with_state(
            s.state("draft"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&draft);
                async move {
                    let first = (s.draft)(ctx.clone(), Value::Null).await?;
                    ctx.set(s.key("v"), first.to_json());
                    ctx.set(s.key("i"), 0);
                    Ok(s.state("crit"))
                }
            }),
        )
        .with_state(
            s.state("crit"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&critique);
                async move {
                    let current = ctx.get(&s.key("v")).unwrap_or(Value::Null);
                    let critique = (s.critique)(ctx.clone(), current).await?;
                    ctx.set(s.key("c"), critique.to_json());
                    Ok(s.state("rev"))
                }
            }),
        )
        .with_state(
            s.state("rev"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&revise);
                async move {
                    let round = bump(&ctx, &s.key("i"));
                    let input = json!({
                        "draft": ctx.get(&s.key("v")).unwrap_or(Value::Null),
                        "critique": ctx.get(&s.key("c")).unwrap_or(Value::Null),
                    });
                    let revised = (s.revise)(ctx.clone(), input).await?.to_json();
                    ctx.set(s.key("v"), revised.clone());
                    let accepted =
                        passes(&s.accept, &ctx, revised).await? || round as usize >= s.rounds;
                    Ok(s.state(if accepted { "done" } else { "crit" }))
                }
            }),
        )
        .with_state(
            s.state("done"),
            state_fn(move |ctx: ChainContext| {
                let s = Arc::clone(&done);
                async move {
                    ctx.set_last(ctx.get(&s.key("v")).unwrap_or(Value::Null));
                    Ok(())
                }
            }),
        )
    }
}
