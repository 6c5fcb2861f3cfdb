use crate::{
    chain::{
        context::ChainContext,
        step::{step, Step},
    },
    types::outcome::Outcome,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::trace;

/// Cache `inner`'s outcome per key. Each call gets its own cache, owned by
/// the returned step and kept out of memory snapshots. Failures are not cached.
pub fn memo<K>(inner: Step, key: K) -> Step
where
    K: Fn(&ChainContext) -> String + Send + Sync + 'static,
{
    let cache: Arc<Mutex<HashMap<String, Outcome>>> = Arc::default();
    step(move |ctx: ChainContext| {
        let inner = Arc::clone(&inner);
        let cache = Arc::clone(&cache);
        let key = key(&ctx);
        async move {
            let hit = cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(&key)
                .cloned();
            if let Some(hit) = hit {
                trace!(target: "agentic_tools::chain", key = %key, "memo hit");
                return Ok(hit);
            }
            let outcome = inner(ctx.clone()).await?;
            cache
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(key, outcome.clone());
            Ok(outcome)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::Memory;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let counted = step(|ctx: ChainContext| async move {
            Ok(ctx
                .memory()
                .update("calls", |v| json!(v.and_then(Value::as_i64).unwrap_or(0) + 1)))
        });
        let cached = memo(counted, |ctx: &ChainContext| {
            ctx.get("city").map(|v| v.to_string()).unwrap_or_default()
        });

        let ctx = ChainContext::new(Memory::new());
        ctx.set("city", "Oslo");
        assert_eq!(cached(ctx.clone()).await.unwrap(), Outcome::from(json!(1)));
        assert_eq!(cached(ctx.clone()).await.unwrap(), Outcome::from(json!(1)));
        ctx.set("city", "Bergen");
        assert_eq!(cached(ctx.clone()).await.unwrap(), Outcome::from(json!(2)));
        assert!(!ctx.memory().snapshot().keys().any(|key| key.starts_with("__memo")));
    }

    #[tokio::test]
    async fn separate_memo_steps_keep_separate_caches() {
        let by_city = |ctx: &ChainContext| ctx.get("city").map(|v| v.to_string()).unwrap_or_default();
        let weather = memo(step(|_ctx: ChainContext| async move { Ok(json!("sunny")) }), by_city);
        let population = memo(step(|_ctx: ChainContext| async move { Ok(json!(709000)) }), by_city);

        let ctx = ChainContext::new(Memory::new());
        ctx.set("city", "Oslo");
        assert_eq!(weather(ctx.clone()).await.unwrap(), Outcome::from(json!("sunny")));
        assert_eq!(population(ctx.clone()).await.unwrap(), Outcome::from(json!(709000)));
        assert_eq!(weather(ctx.clone()).await.unwrap(), Outcome::from(json!("sunny")));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let flaky = memo(
            step(|ctx: ChainContext| async move {
                let calls = ctx
                    .memory()
                    .update("calls", |v| json!(v.and_then(Value::as_i64).unwrap_or(0) + 1));
                if calls == json!(1) {
                    Err(crate::error::AgentError::Unknown("first call fails".into()))
                } else {
                    Ok(calls)
                }
            }),
            |_ctx: &ChainContext| "same".to_string(),
        );

        let ctx = ChainContext::new(Memory::new());
        assert!(flaky(ctx.clone()).await.is_err());
        assert_eq!(flaky(ctx.clone()).await.unwrap(), Outcome::from(json!(2)));
        assert_eq!(flaky(ctx.clone()).await.unwrap(), Outcome::from(json!(2)));
    }
}
