use serde_json::{Map, Value};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Key/value store shared by a chain, its runs and every sub-chain.
///
/// Cloning shares the underlying map. Locks are only held for the duration
/// of a single operation, never across an await point.
#[derive(Clone, Default)]
pub struct Memory {
    values: Arc<Mutex<Map<String, Value>>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(Mutex::new(values)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.values).get(key).cloned()
    }

    /// Like [`Memory::get`], with `null` treated as absent.
    pub fn get_present(&self, key: &str) -> Option<Value> {
        self.get(key).filter(|value| !value.is_null())
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Value {
        let value = value.into();
        lock(&self.values).insert(key.into(), value.clone());
        value
    }

    /// Read-modify-write under one lock; returns the stored value.
    pub fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let mut values = lock(&self.values);
        let value = f(values.get(key));
        values.insert(key.to_string(), value.clone());
        value
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        lock(&self.values).remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.values).contains_key(key)
    }

    pub fn clear(&self) {
        lock(&self.values).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.values).is_empty()
    }

    /// A detached copy of the current contents.
    pub fn snapshot(&self) -> Map<String, Value> {
        lock(&self.values).clone()
    }

    /// Replace the contents in place; every holder sees the new map.
    pub fn replace(&self, values: Map<String, Value>) {
        *lock(&self.values) = values;
    }

    /// An independent store with the same contents.
    pub fn deep_copy(&self) -> Memory {
        Memory::from_map(self.snapshot())
    }

    pub fn shares_with(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    /// Value at a dotted path such as `profile.name`.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let values = lock(&self.values);
        let mut keys = path.split('.');
        let mut current = values.get(keys.next()?)?;
        for key in keys {
            current = match current {
                Value::Object(map) => map.get(key)?,
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }

    /// Store at a dotted path, creating intermediate objects. Non-object
    /// intermediates are replaced.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) -> Value {
        let value = value.into();
        let keys: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = keys.split_last() else {
            return value;
        };

        let mut values = lock(&self.values);
        let mut map = &mut *values;
        for key in parents {
            let slot = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(inner) = slot else {
                return value;
            };
            map = inner;
        }
        map.insert(last.to_string(), value.clone());
        value
    }

    /// Remove the value at a dotted path; missing parents are ignored.
    pub fn remove_path(&self, path: &str) -> Option<Value> {
        let keys: Vec<&str> = path.split('.').collect();
        let (last, parents) = keys.split_last()?;

        let mut values = lock(&self.values);
        let mut map = &mut *values;
        for key in parents {
            map = match map.get_mut(*key) {
                Some(Value::Object(inner)) => inner,
                _ => return None,
            };
        }
        map.remove(*last)
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Memory").field(&self.snapshot()).finish()
    }
}

impl From<Map<String, Value>> for Memory {
    fn from(values: Map<String, Value>) -> Self {
        Memory::from_map(values)
    }
}
