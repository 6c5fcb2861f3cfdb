use super::tool::{Tool, ToolRecord};
use crate::{
    error::{AgentError, Result},
    schemas::tool_schema::ToolSchema,
};
use serde_json::{json, Value};

/// Ordered set of bound tools. The first record registered under a name wins.
#[derive(Debug, Default, Clone)]
pub struct ToolRegistry {
    records: Vec<ToolRecord>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record; returns false when the name was already taken.
    pub fn register(&mut self, record: ToolRecord) -> bool {
        if self.contains(record.name()) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Insert or replace by name; a replaced record keeps its position.
    pub fn upsert(&mut self, record: ToolRecord) {
        match self.records.iter_mut().find(|existing| existing.name() == record.name()) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Keep only the records matching `keep`.
    pub fn retain<F: FnMut(&ToolRecord) -> bool>(&mut self, keep: F) {
        self.records.retain(keep);
    }

    /// Register a [`Tool`] implementation
    pub fn register_tool<T: Tool + 'static>(&mut self, tool: T) -> bool {
        self.register(ToolRecord::from_tool(tool))
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolRecord> {
        self.records.iter().find(|record| record.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get all registered tools
    pub fn list(&self) -> &[ToolRecord] {
        &self.records
    }

    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|record| record.name().to_string()).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.records.iter().map(|record| record.schema.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove by name; returns the removed record.
    pub fn remove(&mut self, name: &str) -> Option<ToolRecord> {
        let index = self.records.iter().position(|record| record.name() == name)?;
        Some(self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// A copy holding only the named tools, in registry order.
    pub fn subset(&self, names: &[&str]) -> ToolRegistry {
        Self {
            records: self
                .records
                .iter()
                .filter(|record| names.contains(&record.name()))
                .cloned()
                .collect(),
        }
    }

    /// Function tool definitions for the chat capability.
    pub fn to_function_tools(&self) -> Vec<Value> {
        self.records
            .iter()
            .map(|record| {
                json!({
                    "type": "function",
                    "name": record.schema.name,
                    "description": record.schema.description,
                    "parameters": record.schema.input_schema.to_wire()
                })
            })
            .collect()
    }

    /// Execute a function call by name
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        let record = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        record.invoke(arguments).await
    }
}

impl FromIterator<ToolRecord> for ToolRegistry {
    fn from_iter<I: IntoIterator<Item = ToolRecord>>(iter: I) -> Self {
        let mut registry = ToolRegistry::new();
        for record in iter {
            registry.register(record);
        }
        registry
    }
}

impl Extend<ToolRecord> for ToolRegistry {
    fn extend<I: IntoIterator<Item = ToolRecord>>(&mut self, iter: I) {
        for record in iter {
            self.register(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schemas::tool_schema::InputSchema,
        tools::tool::{to_tool_value, ToolArgs, ToolFunction},
    };

    fn record(name: &str, reply: &'static str) -> ToolRecord {
        ToolRecord::new(
            ToolSchema::new(name, "", InputSchema::default()),
            ToolFunction::from_async(name, move |_args: ToolArgs| async move { to_tool_value(reply) }),
        )
    }

    #[tokio::test]
    async fn first_registration_wins() {
        let registry: ToolRegistry = vec![record("a", "first"), record("b", "b"), record("a", "second")]
            .into_iter()
            .collect();
        assert_eq!(registry.names(), ["a", "b"]);
        assert_eq!(registry.execute("a", json!({})).await.unwrap(), json!("first"));
    }

    #[tokio::test]
    async fn missing_tool_is_reported() {
        let err = ToolRegistry::new().execute("nope", json!({})).await.unwrap_err();
        assert_eq!(err.error_code(), "TOOL_NOT_FOUND");
    }

    #[test]
    fn function_tools_use_the_flat_wire_shape() {
        let registry: ToolRegistry = vec![record("a", "x")].into_iter().collect();
        let tools = registry.to_function_tools();
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["name"], "a");
        assert_eq!(tools[0]["parameters"]["required"], json!([]));
        assert_eq!(registry.subset(&["b"]).len(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let mut registry: ToolRegistry = vec![record("a", "old"), record("b", "b")].into_iter().collect();
        registry.upsert(record("a", "new"));
        registry.upsert(record("c", "c"));
        assert_eq!(registry.names(), ["a", "b", "c"]);
        assert_eq!(registry.execute("a", json!({})).await.unwrap(), json!("new"));
    }
}
