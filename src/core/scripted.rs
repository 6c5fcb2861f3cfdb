use super::capability::{ChatCapability, ChatRequest, ChatResponse};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

/// In-memory capability that replays canned responses and records every
/// request. Used to drive assistants and chains without a network.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChat {
    replies: Arc<Mutex<VecDeque<Result<ChatResponse>>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: ChatResponse) -> Self {
        lock(&self.replies).push_back(Ok(response));
        self
    }

    pub fn fail(self, error: AgentError) -> Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    pub fn push(&self, response: ChatResponse) {
        lock(&self.replies).push_back(Ok(response));
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl ChatCapability for ScriptedChat {
    async fn respond(&self, request: ChatRequest) -> Result<ChatResponse> {
        lock(&self.requests).push(request);
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Chat("script exhausted".to_string())))
    }
}
