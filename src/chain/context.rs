use super::memory::Memory;
use crate::{
    config::RunOptions,
    core::assistant::ChatAssistant,
    error::{AgentError, Result},
    types::outcome::Outcome,
};
use futures::future::BoxFuture;
use serde_json::Value;
use std::{
    collections::HashSet,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard},
};

/// Async guard evaluated before a queued transition is taken.
pub type Guard = Arc<dyn Fn(ChainContext) -> BoxFuture<'static, bool> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Conditions on a queued soft transition.
#[derive(Clone, Default)]
pub struct NextOptions {
    after: Vec<String>,
    visited_only: bool,
    when: Option<Guard>,
    persist: bool,
}

impl NextOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only fire right after `state` ran. Repeatable: any listed state passes.
    pub fn after(mut self, state: impl Into<String>) -> Self {
        self.after.push(state.into());
        self
    }

    /// Only fire when the target has run before.
    pub fn visited_only(mut self) -> Self {
        self.visited_only = true;
        self
    }

    pub fn when<F, Fut>(mut self, guard: F) -> Self
    where
        F: Fn(ChainContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.when = Some(Arc::new(move |ctx: ChainContext| -> BoxFuture<'static, bool> {
            Box::pin(guard(ctx))
        }));
        self
    }

    /// Keep the transition queued after it is evaluated.
    pub fn persist(mut self) -> Self {
        self.persist = true;
        self
    }
}

impl fmt::Debug for NextOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextOptions")
            .field("after", &self.after)
            .field("visited_only", &self.visited_only)
            .field("when", &self.when.as_ref().map(|_| ".."))
            .field("persist", &self.persist)
            .finish()
    }
}

/// A queued soft transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub target: String,
    pub options: NextOptions,
}

impl Transition {
    pub fn is_once(&self) -> bool {
        !self.options.persist
    }

    /// Whether every guard passes, given the state that just ran.
    pub async fn passes(&self, ctx: &ChainContext, just_ran: &str) -> bool {
        let options = &self.options;
        if !options.after.is_empty() && !options.after.iter().any(|state| state == just_ran) {
            return false;
        }
        if options.visited_only && !ctx.visited(&self.target) {
            return false;
        }
        match &options.when {
            Some(guard) => guard(ctx.clone()).await,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct Navigation {
    goto: Option<String>,
    next: Option<Transition>,
    visited: HashSet<String>,
    current: Option<String>,
}

struct ContextInner {
    memory: Memory,
    assistant: Option<Arc<ChatAssistant>>,
    options: RunOptions,
    item: Option<Value>,
    last: Mutex<Outcome>,
    nav: Mutex<Navigation>,
}

/// Per-run state handed to every step and state handler.
///
/// Cheap to clone; clones refer to the same run. [`ChainContext::branch`]
/// creates a context that shares memory but navigates independently.
#[derive(Clone)]
pub struct ChainContext {
    inner: Arc<ContextInner>,
}

impl ChainContext {
    pub fn new(memory: Memory) -> Self {
        Self::build(memory, None, RunOptions::default(), None, Outcome::Empty)
    }

    fn build(
        memory: Memory,
        assistant: Option<Arc<ChatAssistant>>,
        options: RunOptions,
        item: Option<Value>,
        last: Outcome,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                memory,
                assistant,
                options,
                item,
                last: Mutex::new(last),
                nav: Mutex::new(Navigation::default()),
            }),
        }
    }

    pub fn with_assistant(self, assistant: Option<Arc<ChatAssistant>>) -> Self {
        Self::build(
            self.inner.memory.clone(),
            assistant,
            self.inner.options.clone(),
            self.inner.item.clone(),
            self.last(),
        )
    }

    pub fn with_options(self, options: RunOptions) -> Self {
        Self::build(
            self.inner.memory.clone(),
            self.inner.assistant.clone(),
            options,
            self.inner.item.clone(),
            self.last(),
        )
    }

    /// Same memory, assistant and options; fresh navigation.
    pub fn branch(&self) -> Self {
        Self::build(
            self.inner.memory.clone(),
            self.inner.assistant.clone(),
            self.inner.options.clone(),
            self.inner.item.clone(),
            self.last(),
        )
    }

    /// A branch carrying the current loop item.
    pub fn with_item(&self, item: Value) -> Self {
        Self::build(
            self.inner.memory.clone(),
            self.inner.assistant.clone(),
            self.inner.options.clone(),
            Some(item),
            self.last(),
        )
    }

    pub fn memory(&self) -> &Memory {
        &self.inner.memory
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.memory.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Value {
        self.inner.memory.set(key, value)
    }

    pub fn last(&self) -> Outcome {
        lock(&self.inner.last).clone()
    }

    pub fn set_last(&self, outcome: impl Into<Outcome>) {
        *lock(&self.inner.last) = outcome.into();
    }

    pub fn item(&self) -> Option<&Value> {
        self.inner.item.as_ref()
    }

    pub fn options(&self) -> &RunOptions {
        &self.inner.options
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.options.is_cancelled()
    }

    pub fn assistant(&self) -> Result<Arc<ChatAssistant>> {
        self.inner
            .assistant
            .clone()
            .ok_or_else(|| AgentError::Config("chain has no assistant".to_string()))
    }

    /// Hard jump: overrides any queued transition and the handler's return.
    pub fn goto(&self, state: impl Into<String>) {
        lock(&self.inner.nav).goto = Some(state.into());
    }

    /// Queue a guarded soft transition, replacing any queued one.
    pub fn next(&self, state: impl Into<String>, options: NextOptions) {
        lock(&self.inner.nav).next = Some(Transition {
            target: state.into(),
            options,
        });
    }

    pub fn has_goto(&self) -> bool {
        lock(&self.inner.nav).goto.is_some()
    }

    pub fn clear_goto(&self) {
        lock(&self.inner.nav).goto = None;
    }

    pub(crate) fn take_goto(&self) -> Option<String> {
        lock(&self.inner.nav).goto.take()
    }

    pub fn pending_next(&self) -> Option<Transition> {
        lock(&self.inner.nav).next.clone()
    }

    pub(crate) fn clear_next(&self) {
        lock(&self.inner.nav).next = None;
    }

    pub(crate) fn enter(&self, state: &str) {
        let mut nav = lock(&self.inner.nav);
        nav.current = Some(state.to_string());
        nav.visited.insert(state.to_string());
    }

    pub fn current(&self) -> Option<String> {
        lock(&self.inner.nav).current.clone()
    }

    pub fn visited(&self, state: &str) -> bool {
        lock(&self.inner.nav).visited.contains(state)
    }
}

impl fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainContext")
            .field("memory", &self.inner.memory)
            .field("last", &self.last())
            .field("item", &self.inner.item)
            .field("current", &self.current())
            .finish()
    }
}
