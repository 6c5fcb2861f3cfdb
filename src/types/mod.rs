pub mod outcome;

pub use outcome::{value_truthy, ChatKind, ChatOutcome, Outcome, ToolCallError, ToolCallRecord};
