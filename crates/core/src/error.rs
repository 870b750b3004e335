//! Error types for the agentflow domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Tool and sandbox faults are
//! recovered inside the loops and never reach the caller as `Err`; planning,
//! gateway and unsupported-request faults terminate the turn.

use thiserror::Error;

/// The top-level error type for all agentflow operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Gateway errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Planning errors ---
    #[error("Planning error: {0}")]
    Planning(#[from] PlanningError),

    // --- Rejected before any loop starts ---
    #[error("Unsupported request: {0}")]
    UnsupportedRequest(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("{reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Remote tool discovery failed for {server_id}: {reason}")]
    Discovery { server_id: String, reason: String },

    #[error("Credential lookup failed for {server_id}: {reason}")]
    Credentials { server_id: String, reason: String },
}

/// A structured plan could not be obtained from the model.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("plan is malformed after repair: {reason}")]
    Malformed { content: String, reason: String },

    #[error("plan repair request failed: {0}")]
    RepairFailed(String),
}
