pub mod responses_client;
pub(crate) mod tool_call_utils;

pub use responses_client::ResponsesClient;
