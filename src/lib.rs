//! agentic-tools: expose plain Rust functions as LLM tools and drive them
//! with composable agentic chains.
//!
//! Tool schemas come from function signatures ([`extract`]), from compact
//! parameter specs ([`schemas::param_spec`]) or from `schemars` types. A
//! [`ChatAssistant`] runs the tool-call loop against any [`ChatCapability`];
//! a [`Chain`] sequences chat steps, flow operators and named states over
//! shared [`Memory`].
//!
//! # Quick Start
//!
//! ```rust
//! use agentic_tools::{
//!     core::{ChatResponse, ScriptedChat},
//!     Chain, ChainOps, ChatAssistant,
//! };
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let script = ScriptedChat::new().reply(ChatResponse::text("Paris"));
//! let chain = Chain::with_assistant(Arc::new(ChatAssistant::new(script)))
//!     .set("asked", true)
//!     .chat("Capital of France?");
//!
//! let outcome = chain.run(None, Default::default()).await.unwrap();
//! assert_eq!(outcome.as_text(), Some("Paris"));
//! assert_eq!(chain.memory().get("asked"), Some(serde_json::json!(true)));
//! # });
//! ```

extern crate self as agentic_tools;

pub mod chain;
pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod flow;
pub mod schemas;
pub mod server;
pub mod services;
pub mod tools;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

#[doc(hidden)]
pub use serde_json;

pub use agentic_tools_macros::{define_tool, tool};
pub use chain::{seq, state_fn, step, Chain, ChainContext, ChainOps, ChainSnapshot, Memory, NextOptions, Prompt, Step, Steps};
pub use config::{ChatConfig, RunOptions};
pub use core::{
    ChatAssistant, ChatCapability, ChatOptions, ChoiceKind, ChoiceOptions, ForkOptions, ScriptedChat,
};
pub use error::{AgentError, Constraint, Result, ValidationError};
pub use extract::{extract_tools, ExtractOptions, RustSourceExtractor, SchemaExtractor};
pub use schemas::{parse_params, ParamSet, ToolSchema};
pub use server::{ToolReply, ToolServer};
pub use services::ResponsesClient;
pub use tools::{Tool, ToolArgs, ToolBinder, ToolFunction, ToolModule, ToolRecord, ToolRegistry};
pub use types::{ChatOutcome, Outcome};
