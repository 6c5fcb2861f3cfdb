//! Steps that read and write the shared chain memory.
//!
//! Writers yield the stored value as their outcome, so it becomes `last`.

use crate::{
    chain::{
        context::ChainContext,
        step::{step, Step},
    },
    types::outcome::{value_truthy, Outcome},
};
use serde_json::{Map, Number, Value};
use std::{fmt, sync::Arc};

/// A value given up front or computed from `last` and the context when the
/// step runs.
#[derive(Clone)]
pub enum Source {
    Fixed(Value),
    Computed(Arc<dyn Fn(&Outcome, &ChainContext) -> Value + Send + Sync>),
}

impl Source {
    pub fn computed<F>(compute: F) -> Self
    where
        F: Fn(&Outcome, &ChainContext) -> Value + Send + Sync + 'static,
    {
        Source::Computed(Arc::new(compute))
    }

    /// The current `last`, as JSON.
    pub fn last() -> Self {
        Self::computed(|last, _ctx| last.to_json())
    }

    pub fn resolve(&self, ctx: &ChainContext) -> Value {
        match self {
            Source::Fixed(value) => value.clone(),
            Source::Computed(compute) => compute(&ctx.last(), ctx),
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Fixed(value) => f.debug_tuple("Fixed").field(value).finish(),
            Source::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

macro_rules! fixed_source {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Source {
                fn from(value: $ty) -> Self {
                    Source::Fixed(Value::from(value))
                }
            }
        )*
    };
}

fixed_source!(Value, &str, String, bool, i32, i64, u32, u64, usize, f64, Vec<Value>, Map<String, Value>);

/// Loose numeric reading: numbers, numeric strings and booleans count;
/// anything else is zero.
fn as_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
        Some(Value::String(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(flag)) => f64::from(u8::from(*flag)),
        _ => 0.0,
    };
    if number.is_finite() {
        number
    } else {
        0.0
    }
}

fn number_value(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
    }
}

pub fn set(key: impl Into<String>, value: impl Into<Source>) -> Step {
    let key = key.into();
    let value = value.into();
    step(move |ctx: ChainContext| {
        let stored = ctx.set(key.clone(), value.resolve(&ctx));
        async move { Ok(stored) }
    })
}

/// Read a key; a missing or `null` value falls back to `or_else`.
pub fn get(key: impl Into<String>, or_else: Option<Source>) -> Step {
    let key = key.into();
    step(move |ctx: ChainContext| {
        let value = ctx
            .memory()
            .get_present(&key)
            .or_else(|| or_else.as_ref().map(|source| source.resolve(&ctx)))
            .unwrap_or(Value::Null);
        async move { Ok(value) }
    })
}

/// Set only when the key is missing or `null`.
pub fn def(key: impl Into<String>, value: impl Into<Source>) -> Step {
    let key = key.into();
    let value = value.into();
    step(move |ctx: ChainContext| {
        let outcome = if ctx.memory().get_present(&key).is_none() {
            Outcome::from(ctx.set(key.clone(), value.resolve(&ctx)))
        } else {
            ctx.last()
        };
        async move { Ok(outcome) }
    })
}

/// Replace a key with a function of its current value.
pub fn update<F>(key: impl Into<String>, f: F) -> Step
where
    F: Fn(Option<&Value>, &ChainContext) -> Value + Send + Sync + 'static,
{
    let key = key.into();
    step(move |ctx: ChainContext| {
        let current = ctx.get(&key);
        let stored = ctx.set(key.clone(), f(current.as_ref(), &ctx));
        async move { Ok(stored) }
    })
}

pub fn del(key: impl Into<String>) -> Step {
    let key = key.into();
    step(move |ctx: ChainContext| {
        ctx.memory().remove(&key);
        let last = ctx.last();
        async move { Ok(last) }
    })
}

pub fn clear() -> Step {
    step(|ctx: ChainContext| {
        ctx.memory().clear();
        let last = ctx.last();
        async move { Ok(last) }
    })
}

/// Shallow-merge an object into the one stored at `key`.
pub fn merge(key: impl Into<String>, value: impl Into<Source>) -> Step {
    let key = key.into();
    let value = value.into();
    step(move |ctx: ChainContext| {
        let patch = value.resolve(&ctx);
        let stored = ctx.memory().update(&key, |current| {
            let mut merged = match current {
                Some(Value::Object(existing)) => existing.clone(),
                _ => Map::new(),
            };
            if let Value::Object(patch) = patch {
                merged.extend(patch);
            }
            Value::Object(merged)
        });
        async move { Ok(stored) }
    })
}

/// Append to the array at `key`, creating it when missing.
pub fn push(key: impl Into<String>, value: impl Into<Source>) -> Step {
    let key = key.into();
    let value = value.into();
    step(move |ctx: ChainContext| {
        let item = value.resolve(&ctx);
        let stored = ctx.memory().update(&key, |current| {
            let mut items = match current {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            items.push(item);
            Value::Array(items)
        });
        async move { Ok(stored) }
    })
}

/// Remove the array's last element; the popped element becomes `last`.
pub fn pop(key: impl Into<String>) -> Step {
    let key = key.into();
    step(move |ctx: ChainContext| {
        let mut popped = None;
        ctx.memory().update(&key, |current| {
            let mut items = match current {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            popped = items.pop();
            Value::Array(items)
        });
        let outcome = popped.map(Outcome::from).unwrap_or_default();
        async move { Ok(outcome) }
    })
}

/// Add `by` to the number at `key`. Missing or non-numeric values count as 0.
pub fn inc(key: impl Into<String>, by: impl Into<Source>) -> Step {
    let key = key.into();
    let by = by.into();
    step(move |ctx: ChainContext| {
        let delta = as_number(Some(&by.resolve(&ctx)));
        let stored = ctx
            .memory()
            .update(&key, |current| number_value(as_number(current) + delta));
        async move { Ok(stored) }
    })
}

pub fn dec(key: impl Into<String>, by: impl Into<Source>) -> Step {
    let key = key.into();
    let by = by.into();
    step(move |ctx: ChainContext| {
        let delta = as_number(Some(&by.resolve(&ctx)));
        let stored = ctx
            .memory()
            .update(&key, |current| number_value(as_number(current) - delta));
        async move { Ok(stored) }
    })
}

pub fn toggle(key: impl Into<String>) -> Step {
    let key = key.into();
    step(move |ctx: ChainContext| {
        let stored = ctx
            .memory()
            .update(&key, |current| Value::Bool(!current.is_some_and(value_truthy)));
        async move { Ok(stored) }
    })
}

pub fn copy(from: impl Into<String>, to: impl Into<String>) -> Step {
    let (from, to) = (from.into(), to.into());
    step(move |ctx: ChainContext| {
        let value = ctx.get(&from).unwrap_or(Value::Null);
        let stored = ctx.set(to.clone(), value);
        async move { Ok(stored) }
    })
}

pub fn move_key(from: impl Into<String>, to: impl Into<String>) -> Step {
    let (from, to) = (from.into(), to.into());
    step(move |ctx: ChainContext| {
        let value = ctx.memory().remove(&from).unwrap_or(Value::Null);
        let stored = ctx.set(to.clone(), value);
        async move { Ok(stored) }
    })
}

/// Store `last` under `key`, leaving `last` as is.
pub fn set_last(key: impl Into<String>) -> Step {
    let key = key.into();
    step(move |ctx: ChainContext| {
        let last = ctx.last();
        ctx.set(key.clone(), last.to_json());
        async move { Ok(last) }
    })
}

/// Write at a dotted path, creating intermediate objects.
pub fn set_path(path: impl Into<String>, value: impl Into<Source>) -> Step {
    let path = path.into();
    let value = value.into();
    step(move |ctx: ChainContext| {
        let stored = ctx.memory().set_path(&path, value.resolve(&ctx));
        async move { Ok(stored) }
    })
}

pub fn get_path(path: impl Into<String>, or_else: Option<Source>) -> Step {
    let path = path.into();
    step(move |ctx: ChainContext| {
        let value = ctx
            .memory()
            .get_path(&path)
            .filter(|value| !value.is_null())
            .or_else(|| or_else.as_ref().map(|source| source.resolve(&ctx)))
            .unwrap_or(Value::Null);
        async move { Ok(value) }
    })
}

pub fn del_path(path: impl Into<String>) -> Step {
    let path = path.into();
    step(move |ctx: ChainContext| {
        ctx.memory().remove_path(&path);
        let last = ctx.last();
        async move { Ok(last) }
    })
}
