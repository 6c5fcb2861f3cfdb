//! Concurrency limits: a bulkhead (semaphore) and a FIFO work queue.

use crate::{
    chain::{
        context::ChainContext,
        step::{step, Step},
    },
    error::{AgentError, Result},
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::Semaphore;

/// At most `permits` wrapped steps run at once. Clones share permits.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    permits: Arc<Semaphore>,
    size: usize,
}

impl Bulkhead {
    pub fn new(permits: usize) -> Self {
        let size = permits.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AgentError::Aborted)?;
        fut.await
    }
}

pub fn with_bulkhead(inner: Step, bulkhead: Bulkhead) -> Step {
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let bulkhead = bulkhead.clone();
        async move { bulkhead.run(inner(ctx)).await }
    })
}

/// Runs pushed jobs in arrival order with bounded concurrency.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    bulkhead: Bulkhead,
    waiting: Arc<AtomicUsize>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(1)
    }
}

impl WorkQueue {
    pub fn new(concurrency: usize) -> Self {
        Self {
            bulkhead: Bulkhead::new(concurrency),
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Jobs queued but not yet started.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.bulkhead.size() - self.bulkhead.available()
    }

    pub async fn push<T, F>(&self, job: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let queued = Waiting::enter(&self.waiting);
        let permit = self.bulkhead.permits.acquire().await;
        drop(queued);
        let _permit = permit.map_err(|_| AgentError::Aborted)?;
        job.await
    }
}

/// Counts one queued job; leaving the queue, or dropping the push future
/// while it waits, releases the count.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn with_queue(inner: Step, queue: WorkQueue) -> Step {
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let queue = queue.clone();
        async move { queue.push(inner(ctx)).await }
    })
}
