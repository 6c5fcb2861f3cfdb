//! Serving tools to another process over JSON-RPC 2.0.
//!
//! A [`ToolServer`] answers `initialize`, `tools/list` and `tools/call` for
//! bound [`ToolRecord`](crate::tools::ToolRecord)s and inline tools declared
//! with compact parameter specs.
//!
//! ```
//! use agentic_tools::server::{ToolReply, ToolServer};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut server = ToolServer::new("notes", "1.0.0");
//! server
//!     .tool("shout @ Upper-case a line", &["text!"], |args, _memory| async move {
//!         Ok(ToolReply::new(args["text"].as_str().unwrap_or("").to_uppercase()))
//!     })
//!     .unwrap();
//!
//! let response = server
//!     .handle(json!({
//!         "jsonrpc": "2.0",
//!         "id": 1,
//!         "method": "tools/call",
//!         "params": {"name": "shout", "arguments": {"text": "hi"}}
//!     }))
//!     .await
//!     .unwrap();
//! assert_eq!(response["result"]["structuredContent"], "HI");
//! # });
//! ```

pub mod content;
pub mod dispatcher;
pub mod inline;
pub mod rpc;

pub use content::{normalize, Content};
pub use dispatcher::ToolServer;
pub use inline::{InlineTool, ToolReply};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
