//! Tool abstractions: callable functions, bound records, the registry and
//! the binder that wires extracted schemas to live functions.

pub mod binder;
pub mod imports;
pub mod registry;
pub mod tool;

pub use binder::{ToolBinder, ToolModule};
pub use imports::{parse_imports, ImportEntry};
pub use registry::ToolRegistry;
pub use tool::{to_tool_value, Tool, ToolArgs, ToolFunction, ToolFuture, ToolRecord};
