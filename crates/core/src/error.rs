//! Error types shared across the vaultgate workspace.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! (OAuth, path validation, version control) defines its own error enum in
//! its own crate; this one covers tool execution and configuration, the two
//! concerns that live in `vaultgate-core` itself.

use thiserror::Error;

/// The top-level error type for operations that don't belong to a more
/// specific bounded-context error enum.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Path confinement violation: {0}")]
    PathEscape(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
