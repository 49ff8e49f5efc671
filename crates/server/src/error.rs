//! Structured errors for tool input handling.
//!
//! Failures from the router itself arrive as `offcache_core::Error`; these
//! cover the parameters a caller sends.

use offcache_client::UrlError;
use offcache_core::ConfigError;
use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Structured errors for the offcache server.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid input parameters (e.g., empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Overrides produced an invalid worker configuration.
    #[error("INVALID_CONFIG: {0}")]
    Config(#[from] ConfigError),

    /// The requested URL could not be resolved.
    #[error("INVALID_URL: {0}")]
    Url(#[from] UrlError),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::Config(e) => (-32602, e.to_string()),
            ToolError::Url(e) => (-32003, e.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
