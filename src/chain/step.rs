use super::context::ChainContext;
use crate::{error::Result, types::outcome::Outcome};
use futures::future::BoxFuture;
use std::{fmt, future::Future, sync::Arc};

/// An async unit of work; its outcome becomes the context's `last`.
pub type Step = Arc<dyn Fn(ChainContext) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;

/// A named-state handler; resolves to the next state, or `None` to stop.
pub type StateFn = Arc<dyn Fn(ChainContext) -> BoxFuture<'static, Result<Option<String>>> + Send + Sync>;

/// Receives a run's error and context and may substitute a result.
pub type ErrorHandler =
    Arc<dyn Fn(crate::error::AgentError, ChainContext) -> BoxFuture<'static, Result<Outcome>> + Send + Sync>;

/// Wrap an async closure as a [`Step`].
///
/// ```
/// use agentic_tools::chain::{step, ChainContext};
///
/// let greet = step(|ctx: ChainContext| async move {
///     let name = ctx.get("name").and_then(|v| v.as_str().map(str::to_string));
///     Ok(format!("hello {}", name.unwrap_or_default()))
/// });
/// # let _ = greet;
/// ```
pub fn step<F, Fut, O>(f: F) -> Step
where
    F: Fn(ChainContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
    O: Into<Outcome>,
{
    Arc::new(move |ctx: ChainContext| -> BoxFuture<'static, Result<Outcome>> {
        let fut = f(ctx);
        Box::pin(async move { fut.await.map(Into::into) })
    })
}

/// Wrap an async closure as a [`StateFn`].
pub fn state_fn<F, Fut, N>(f: F) -> StateFn
where
    F: Fn(ChainContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<N>> + Send + 'static,
    N: IntoNext,
{
    Arc::new(move |ctx: ChainContext| -> BoxFuture<'static, Result<Option<String>>> {
        let fut = f(ctx);
        Box::pin(async move { fut.await.map(IntoNext::into_next) })
    })
}

/// What a state handler may return to pick the next state.
pub trait IntoNext {
    fn into_next(self) -> Option<String>;
}

impl IntoNext for () {
    fn into_next(self) -> Option<String> {
        None
    }
}

impl IntoNext for String {
    fn into_next(self) -> Option<String> {
        Some(self)
    }
}

impl IntoNext for &str {
    fn into_next(self) -> Option<String> {
        Some(self.to_string())
    }
}

impl IntoNext for Option<String> {
    fn into_next(self) -> Option<String> {
        self
    }
}

impl IntoNext for Option<&str> {
    fn into_next(self) -> Option<String> {
        self.map(str::to_string)
    }
}

/// Prompt text, fixed or rendered from the context when the step runs.
#[derive(Clone)]
pub enum Prompt {
    Text(String),
    Dynamic(Arc<dyn Fn(&ChainContext) -> String + Send + Sync>),
}

impl Prompt {
    pub fn dynamic<F>(render: F) -> Self
    where
        F: Fn(&ChainContext) -> String + Send + Sync + 'static,
    {
        Prompt::Dynamic(Arc::new(render))
    }

    pub fn render(&self, ctx: &ChainContext) -> String {
        match self {
            Prompt::Text(text) => text.clone(),
            Prompt::Dynamic(render) => render(ctx),
        }
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Prompt::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}
