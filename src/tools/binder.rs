use super::{
    imports::{parse_imports, ImportEntry},
    registry::ToolRegistry,
    tool::{ToolFunction, ToolRecord},
};
use crate::{
    extract::{RustSourceExtractor, SchemaExtractor},
    schemas::tool_schema::ToolSchema,
};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;

/// A source module as the binder sees it: its path, its text (usually
/// `include_str!`) and the live functions it exports.
#[derive(Debug, Clone)]
pub struct ToolModule {
    pub path: String,
    pub source: String,
    pub functions: Vec<ToolFunction>,
}

impl ToolModule {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            functions: Vec::new(),
        }
    }

    pub fn with_function(mut self, function: ToolFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_functions(mut self, functions: impl IntoIterator<Item = ToolFunction>) -> Self {
        self.functions.extend(functions);
        self
    }

    pub fn function(&self, name: &str) -> Option<&ToolFunction> {
        self.functions.iter().find(|function| function.name() == name)
    }
}

/// Merges extracted schemas with live functions.
///
/// Lookup order for each schema name: the explicit function list, then the
/// caller's local imports (through the module table), then the caller's own
/// functions. Schemas with no function are dropped.
#[derive(Clone)]
pub struct ToolBinder {
    extractor: Arc<dyn SchemaExtractor + Send + Sync>,
    modules: HashMap<String, ToolModule>,
}

impl fmt::Debug for ToolBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<&String> = self.modules.keys().collect();
        paths.sort();
        f.debug_struct("ToolBinder").field("modules", &paths).finish()
    }
}

impl Default for ToolBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolBinder {
    pub fn new() -> Self {
        Self::with_extractor(RustSourceExtractor::new())
    }

    pub fn with_extractor<E: SchemaExtractor + Send + Sync + 'static>(extractor: E) -> Self {
        Self {
            extractor: Arc::new(extractor),
            modules: HashMap::new(),
        }
    }

    /// Make a module loadable through imports.
    pub fn add_module(&mut self, module: ToolModule) -> &mut Self {
        self.modules.insert(module.path.clone(), module);
        self
    }

    pub fn module(mut self, module: ToolModule) -> Self {
        self.add_module(module);
        self
    }

    /// Resolve an import to a known module: either the item itself is a
    /// module, or it lives in one.
    fn imported_module(&self, entry: &ImportEntry) -> Option<&ToolModule> {
        entry
            .item_path()
            .and_then(|path| self.modules.get(&path))
            .or_else(|| self.modules.get(&entry.module))
    }

    /// Bind every tool visible from `caller`.
    pub fn bind(&self, caller: &ToolModule, explicit: &[ToolFunction]) -> ToolRegistry {
        let imports = parse_imports(&caller.source, &caller.path);

        let mut imported: Vec<&ToolModule> = Vec::new();
        for entry in &imports {
            if let Some(module) = self.imported_module(entry) {
                if !imported.iter().any(|seen| seen.path == module.path) {
                    imported.push(module);
                }
            }
        }

        let mut candidates: Vec<(ToolSchema, Option<&ToolModule>)> = self
            .extractor
            .extract(&caller.source)
            .into_iter()
            .map(|schema| (schema, None))
            .collect();
        for module in &imported {
            candidates.extend(
                self.extractor
                    .extract(&module.source)
                    .into_iter()
                    .map(|schema| (schema, Some(*module))),
            );
        }

        let mut registry = ToolRegistry::new();
        for (schema, origin) in candidates {
            if registry.contains(&schema.name) {
                continue;
            }
            let function = explicit
                .iter()
                .find(|function| function.name() == schema.name)
                .or_else(|| match origin {
                    Some(module) => module.function(&schema.name),
                    None => caller.function(&schema.name),
                });
            match function {
                Some(function) => {
                    registry.register(ToolRecord::new(schema, function.clone()));
                }
                None => debug!(
                    target: "agentic_tools::registry",
                    tool = %schema.name,
                    module = origin.map(|m| m.path.as_str()).unwrap_or(caller.path.as_str()),
                    "no function bound; tool dropped"
                ),
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::{to_tool_value, ToolArgs};
    use serde_json::json;

    fn function(name: &'static str, reply: &'static str) -> ToolFunction {
        ToolFunction::from_async(name, move |_args: ToolArgs| async move { to_tool_value(reply) })
    }

    const WEATHER: &str = r#"
        /// Forecast
        pub fn forecast(city: String) -> String { city }
        pub fn alerts() -> Vec<String> { vec![] }
        pub fn unbound() {}
    "#;

    const APP: &str = r#"
        use crate::weather::{forecast, alerts as warnings};

        /// Local echo
        pub fn echo(text: String) -> String { text }
        pub fn alerts() -> Vec<String> { vec![] }
    "#;

    fn binder() -> ToolBinder {
        ToolBinder::new().module(
            ToolModule::new("crate::weather", WEATHER)
                .with_function(function("forecast", "sunny"))
                .with_function(function("alerts", "none")),
        )
    }

    #[tokio::test]
    async fn resolves_explicit_imported_and_local_functions() {
        let caller = ToolModule::new("crate::app", APP)
            .with_function(function("echo", "local echo"))
            .with_function(function("alerts", "local alerts"));

        let registry = binder().bind(&caller, &[function("forecast", "explicit")]);

        assert_eq!(registry.names(), ["echo", "alerts", "forecast"]);
        assert_eq!(
            registry.execute("forecast", json!({"city": "Oslo"})).await.unwrap(),
            json!("explicit")
        );
        assert_eq!(
            registry.execute("alerts", json!({})).await.unwrap(),
            json!("local alerts")
        );
        assert!(!registry.contains("unbound"));
    }

    #[tokio::test]
    async fn imported_functions_bind_without_explicit_list() {
        let caller = ToolModule::new("crate::app", APP);
        let registry = binder().bind(&caller, &[]);
        assert_eq!(registry.names(), ["forecast", "alerts"]);
        assert_eq!(
            registry.execute("alerts", json!({})).await.unwrap(),
            json!("none")
        );
    }

    #[test]
    fn unknown_modules_are_ignored() {
        let caller = ToolModule::new("crate::app", "use crate::missing::thing;");
        assert!(binder().bind(&caller, &[]).is_empty());
    }
}
