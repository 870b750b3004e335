//! The sandbox boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What came back from one isolated run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxResponse {
    /// The program's own console output.
    pub stdout: String,

    /// The result envelope, when the program got far enough to write one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Set when the runtime itself failed (syntax error, crash, missing envelope).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_fault: Option<String>,
}

/// The call into the sandbox itself failed.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to start sandbox runtime: {0}")]
    Spawn(String),

    #[error("sandbox timed out after {0}s")]
    Timeout(u64),

    #[error("sandbox I/O failed: {0}")]
    Io(String),

    #[error("sandbox returned an unreadable result: {0}")]
    Protocol(String),

    #[error("sandbox confinement unavailable: {0}")]
    Confinement(String),

    #[error("sandbox output exceeded {0} bytes; run killed")]
    OutputLimit(usize),
}

/// Runs a complete, self-contained program in isolation.
///
/// Implementations must not share state between calls: every program starts
/// from a fresh namespace.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, program: &str) -> Result<SandboxResponse, SandboxError>;
}
