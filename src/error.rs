use serde::Serialize;
use thiserror::Error;

/// Main error type for tool binding, chat dispatch and chain execution
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat capability error: {0}")]
    Chat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter spec `{spec}`: {reason}")]
    SpecParse { spec: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid function call: {0}")]
    InvalidFunctionCall(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: retry after {retry_after}s")]
    RateLimit { retry_after: u64 },

    #[error("State '{0}' not found")]
    StateNotFound(String),

    #[error("Max state steps exceeded ({0})")]
    MaxStepsExceeded(usize),

    #[error("Run aborted")]
    Aborted,

    #[error("Circuit open")]
    CircuitOpen,

    #[error("All {} alternatives failed: {}", .0.len(), join_messages(.0))]
    AllFailed(Vec<AgentError>),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AgentError>;

fn join_messages(errors: &[AgentError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AgentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Http(err) => err.is_timeout() || err.is_connect(),
            AgentError::Chat(_) => true,
            AgentError::Validation(_) => true,
            AgentError::RateLimit { .. } => true,
            AgentError::Timeout(_) => true,
            AgentError::CircuitOpen => true,
            _ => false,
        }
    }

    /// True when a chain stopped because it ran out of state transitions.
    pub fn is_max_steps(&self) -> bool {
        matches!(self, AgentError::MaxStepsExceeded(_))
    }

    /// Get the error code for structured responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "CONFIG_ERROR",
            AgentError::Http(_) => "HTTP_ERROR",
            AgentError::Chat(_) => "CHAT_ERROR",
            AgentError::Serialization(_) => "SERIALIZATION_ERROR",
            AgentError::Io(_) => "IO_ERROR",
            AgentError::SpecParse { .. } => "SPEC_PARSE_ERROR",
            AgentError::Validation(_) => "VALIDATION_ERROR",
            AgentError::ToolExecution(_) => "TOOL_EXECUTION_ERROR",
            AgentError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            AgentError::InvalidFunctionCall(_) => "INVALID_FUNCTION_CALL",
            AgentError::Timeout(_) => "TIMEOUT_ERROR",
            AgentError::RateLimit { .. } => "RATE_LIMIT_ERROR",
            AgentError::StateNotFound(_) => "STATE_NOT_FOUND",
            AgentError::MaxStepsExceeded(_) => "MAX_STEPS_EXCEEDED",
            AgentError::Aborted => "ABORTED",
            AgentError::CircuitOpen => "CIRCUIT_OPEN",
            AgentError::AllFailed(_) => "ALL_FAILED",
            AgentError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Convert to a structured error payload
    pub fn to_error_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "retryable": self.is_retryable()
            }
        });
        if let AgentError::Validation(validation) = self {
            payload["error"]["field"] = serde_json::json!(validation.field);
            payload["error"]["constraint"] = serde_json::json!(validation.constraint);
        }
        payload
    }
}

/// The rule a value broke while being checked against a parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Required,
    Type,
    Integer,
    Enum,
    Pattern,
    Items,
    Schema,
}

/// A parameter value that failed validation, naming the field and the rule.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub constraint: Constraint,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, constraint: Constraint, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_payload_names_field() {
        let error = AgentError::from(ValidationError::new(
            "zip",
            Constraint::Pattern,
            "does not match /^\\d{5}$/",
        ));
        let payload = error.to_error_payload();
        assert_eq!(payload["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(payload["error"]["field"], "zip");
        assert_eq!(payload["error"]["constraint"], "pattern");
    }

    #[test]
    fn max_steps_is_distinct() {
        assert!(AgentError::MaxStepsExceeded(3).is_max_steps());
        assert!(!AgentError::StateNotFound("x".into()).is_max_steps());
        assert_eq!(
            AgentError::AllFailed(vec![
                AgentError::Unknown("a".into()),
                AgentError::Unknown("b".into())
            ])
            .to_string(),
            "All 2 alternatives failed: Unknown error: a; Unknown error: b"
        );
    }
}
