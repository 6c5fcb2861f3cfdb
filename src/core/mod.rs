pub mod assistant;
pub mod capability;
pub mod scripted;

pub use assistant::{slug, ChatAssistant, ChatOptions, ChoiceKind, ChoiceOptions, ForkOptions};
pub use capability::{
    ChatCapability, ChatInput, ChatRequest, ChatResponse, FunctionCall, FunctionOutput, ToolChoice,
};
pub use scripted::ScriptedChat;
