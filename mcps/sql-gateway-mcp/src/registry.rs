//! In-process tool dispatch
//!
//! [`InProcessServer`] lets a host call the gateway's tools by name without a
//! transport. Together with the rmcp `ToolRouter` it forms the operation
//! registry: built once per server value and passed around by reference.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    /// The tool ran and failed; `data` keeps the gateway error kind
    #[error("tool failed: {message}")]
    ToolFailed {
        message: String,
        data: Option<Value>,
    },
}

impl From<rmcp::ErrorData> for DispatchError {
    fn from(err: rmcp::ErrorData) -> Self {
        DispatchError::ToolFailed {
            message: err.message.to_string(),
            data: err.data,
        }
    }
}

impl DispatchError {
    /// Gateway error kind, when the failure came from a gateway operation
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::ToolFailed { data: Some(data), .. } => data.get("kind").and_then(Value::as_str),
            _ => None,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// A server whose tools can be invoked directly
#[async_trait]
pub trait InProcessServer: Send + Sync {
    fn server_name(&self) -> &str;

    fn list_tools(&self) -> Vec<Tool>;

    /// Run tool `name` with JSON `params`
    async fn call_tool(&self, name: &str, params: Value) -> DispatchResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_error_data() {
        let err: DispatchError = rmcp::ErrorData::invalid_params(
            "query rejected",
            Some(json!({ "kind": "policy_violation" })),
        )
        .into();
        assert_eq!(err.kind(), Some("policy_violation"));

        assert_eq!(DispatchError::ToolNotFound("x".into()).kind(), None);
    }
}
