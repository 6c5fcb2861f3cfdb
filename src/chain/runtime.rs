use super::{
    context::ChainContext,
    memory::Memory,
    step::{state_fn, ErrorHandler, IntoNext, StateFn, Step},
};
use crate::{
    config::RunOptions,
    core::assistant::{ChatAssistant, ForkOptions},
    error::{AgentError, Result},
    tools::tool::ToolRecord,
    types::outcome::Outcome,
};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::{debug, warn};

/// Memory plus the assistant's continuation handle, enough to resume later.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub memory: Map<String, Value>,
    pub prev: Option<String>,
}

/// A linear list of steps followed by a named-state machine.
///
/// ```
/// use agentic_tools::chain::{Chain, ChainContext};
///
/// # tokio_test::block_on(async {
/// let chain = Chain::new()
///     .state("first", |ctx: ChainContext| async move {
///         ctx.set("x", 1);
///         Ok("second")
///     })
///     .state("second", |_ctx: ChainContext| async move { Ok(()) });
///
/// chain.run_from("first").await.unwrap();
/// assert_eq!(chain.memory().get("x"), Some(serde_json::json!(1)));
/// # });
/// ```
#[derive(Default)]
pub struct Chain {
    assistant: Option<Arc<ChatAssistant>>,
    steps: Vec<Step>,
    states: HashMap<String, StateFn>,
    memory: Memory,
    on_error: Option<ErrorHandler>,
    last: Arc<Mutex<Outcome>>,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<&String> = self.states.keys().collect();
        states.sort();
        f.debug_struct("Chain")
            .field("assistant", &self.assistant)
            .field("steps", &self.steps.len())
            .field("states", &states)
            .field("memory", &self.memory)
            .finish()
    }
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assistant(assistant: Arc<ChatAssistant>) -> Self {
        Self {
            assistant: Some(assistant),
            ..Self::default()
        }
    }

    pub fn assistant(&self) -> Option<&Arc<ChatAssistant>> {
        self.assistant.as_ref()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn steps(&self) -> usize {
        self.steps.len()
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Append a plain step.
    pub fn then_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Register a named state; a later registration replaces an earlier one.
    pub fn state<F, Fut, N>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ChainContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<N>> + Send + 'static,
        N: IntoNext,
    {
        self.with_state(name, state_fn(handler))
    }

    pub fn with_state(mut self, name: impl Into<String>, handler: StateFn) -> Self {
        self.states.insert(name.into(), handler);
        self
    }

    /// Recover from a failed run; the handler's result becomes the run's.
    pub fn on_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(AgentError, ChainContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Outcome>> + Send + 'static,
    {
        self.on_error = Some(Arc::new(
            move |err: AgentError, ctx: ChainContext| -> BoxFuture<'static, Result<Outcome>> {
                Box::pin(handler(err, ctx))
            },
        ));
        self
    }

    /// Drop steps, states, memory contents and the last result.
    pub fn reset(&mut self) -> &mut Self {
        self.steps.clear();
        self.states.clear();
        self.memory.clear();
        self.set_result(Outcome::Empty);
        self
    }

    /// An empty chain on a forked assistant with a deep copy of memory.
    pub fn clone_chain(&self) -> Chain {
        Chain {
            assistant: self.forked_assistant(),
            memory: self.memory.deep_copy(),
            ..Chain::default()
        }
    }

    /// A new chain on a forked assistant, configured by `build`. Run it
    /// directly or turn it into a step with [`Chain::into_step`].
    pub fn sub(&self, build: impl FnOnce(Chain) -> Chain) -> Chain {
        build(Chain {
            assistant: self.forked_assistant(),
            ..Chain::default()
        })
    }

    fn forked_assistant(&self) -> Option<Arc<ChatAssistant>> {
        self.assistant
            .as_ref()
            .map(|assistant| Arc::new(assistant.fork(ForkOptions::default())))
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            memory: self.memory.snapshot(),
            prev: self.assistant.as_ref().and_then(|assistant| assistant.continuation()),
        }
    }

    pub fn restore(&self, snapshot: ChainSnapshot) -> &Self {
        self.memory.replace(snapshot.memory);
        if let Some(assistant) = &self.assistant {
            assistant.set_continuation(snapshot.prev);
        }
        self
    }

    /// The `last` value of the most recent successful run.
    pub fn result(&self) -> Outcome {
        self.last.lock().map(|last| last.clone()).unwrap_or_default()
    }

    fn set_result(&self, outcome: Outcome) {
        if let Ok(mut last) = self.last.lock() {
            *last = outcome;
        }
    }

    /// Merge tools into this chain's assistant, copying it first when it is
    /// shared.
    pub fn add_tools(mut self, tools: impl IntoIterator<Item = ToolRecord>) -> Self {
        if let Some(assistant) = self.assistant_mut() {
            assistant.add_tools(tools);
        }
        self
    }

    pub fn remove_tools(mut self, names: &[&str]) -> Self {
        if let Some(assistant) = self.assistant_mut() {
            assistant.remove_tools(names);
        }
        self
    }

    pub fn clear_tools(mut self) -> Self {
        if let Some(assistant) = self.assistant_mut() {
            assistant.clear_tools();
        }
        self
    }

    fn assistant_mut(&mut self) -> Option<&mut ChatAssistant> {
        let shared = self.assistant.as_mut()?;
        if Arc::get_mut(shared).is_none() {
            let copy = shared.fork(ForkOptions::default());
            copy.set_continuation(shared.continuation());
            *shared = Arc::new(copy);
        }
        Arc::get_mut(shared)
    }

    /// Run against this chain's own memory.
    pub async fn run(&self, start: Option<&str>, options: RunOptions) -> Result<Outcome> {
        let ctx = ChainContext::new(self.memory.clone())
            .with_assistant(self.assistant.clone())
            .with_options(options);
        self.execute(ctx, start).await
    }

    pub async fn run_from(&self, start: &str) -> Result<Outcome> {
        self.run(Some(start), RunOptions::default()).await
    }

    /// A step that runs this chain as a sub-chain of the calling context:
    /// memory is shared, navigation is not.
    pub fn into_step(self) -> Step {
        self.into_step_from(None)
    }

    /// Like [`Chain::into_step`], entering the state machine at `start`.
    pub fn into_step_from(self, start: Option<String>) -> Step {
        let chain = Arc::new(self);
        Arc::new(move |ctx: ChainContext| -> BoxFuture<'static, Result<Outcome>> {
            let chain = Arc::clone(&chain);
            let start = start.clone();
            Box::pin(async move {
                let assistant = chain.assistant.clone().or_else(|| ctx.assistant().ok());
                let sub = ctx.branch().with_assistant(assistant);
                chain.execute(sub, start.as_deref()).await
            })
        })
    }

    async fn execute(&self, ctx: ChainContext, start: Option<&str>) -> Result<Outcome> {
        match self.drive(&ctx, start).await {
            Ok(()) => {
                let last = ctx.last();
                self.set_result(last.clone());
                Ok(last)
            }
            Err(err) => match &self.on_error {
                Some(handler) => {
                    debug!(target: "agentic_tools::chain", error = %err, "run failed; invoking error handler");
                    handler(err, ctx).await
                }
                None => Err(err),
            },
        }
    }

    async fn drive(&self, ctx: &ChainContext, start: Option<&str>) -> Result<()> {
        let options = ctx.options().clone();
        check_signal(ctx)?;

        for (index, step) in self.steps.iter().enumerate() {
            check_signal(ctx)?;
            debug!(target: "agentic_tools::chain", step = index, "running step");
            let outcome = guarded(options.default_timeout, step(ctx.clone())).await?;
            ctx.set_last(outcome);
        }

        let mut current = ctx
            .take_goto()
            .or_else(|| start.map(str::to_string))
            .filter(|state| !state.is_empty());
        let mut executed = 0usize;

        while let Some(state) = current {
            check_signal(ctx)?;
            executed += 1;
            if executed > options.max_steps {
                warn!(
                    target: "agentic_tools::chain",
                    max_steps = options.max_steps,
                    state = %state,
                    "max state steps exceeded"
                );
                return Err(AgentError::MaxStepsExceeded(options.max_steps));
            }
            let handler = self
                .states
                .get(&state)
                .ok_or_else(|| AgentError::StateNotFound(state.clone()))?;

            ctx.enter(&state);
            debug!(target: "agentic_tools::chain", state = %state, step = executed, "entering state");
            let returned = guarded(options.default_timeout, handler(ctx.clone())).await?;

            let next = if let Some(target) = ctx.take_goto() {
                ctx.clear_next();
                Some(target)
            } else if let Some(transition) = ctx.pending_next() {
                let taken = transition.passes(ctx, &state).await;
                if transition.is_once() {
                    ctx.clear_next();
                }
                if taken {
                    Some(transition.target)
                } else {
                    returned
                }
            } else {
                returned
            };
            current = next.filter(|state| !state.is_empty());
        }
        Ok(())
    }
}

fn check_signal(ctx: &ChainContext) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(AgentError::Aborted);
    }
    Ok(())
}

/// Await `fut`, failing with a timeout error once `limit` elapses.
pub(crate) async fn guarded<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) if !limit.is_zero() => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| AgentError::Timeout(format!("timed out after {}ms", limit.as_millis())))?,
        _ => fut.await,
    }
}

impl ChatAssistant {
    /// A chain driven by a fork of this assistant.
    pub fn chain(&self, overrides: ForkOptions) -> Chain {
        Chain::with_assistant(Arc::new(self.fork(overrides)))
    }
}
