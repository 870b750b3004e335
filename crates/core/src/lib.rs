//! # agentflow core
//!
//! Domain types, traits, and error definitions for the agentflow
//! orchestration engine. This crate has no framework dependencies; it defines
//! the seams every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`ModelGateway`] for model inference
//! - [`RemoteToolSource`] and [`CredentialProvider`] for remote tools
//! - [`Tool`] and [`BlockingTool`] for local capabilities
//!
//! Implementations live in their respective crates, and tests swap in
//! scripted stand-ins.

pub mod error;
pub mod gateway;
pub mod message;
pub mod remote;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, PlanningError, ProviderError, Result, ToolError};
pub use gateway::{
    ModelBinding, ModelGateway, ModelRequest, ModelResponse, OutputSchema, StreamChunk,
    StructuredOutput, ToolDefinition, Usage,
};
pub use message::{Message, MessageToolCall, Role};
pub use remote::{CredentialPolicy, CredentialProvider, RemoteServerConfig, RemoteToolSource};
pub use tool::{
    BlockingTool, LocalTool, Tool, ToolCall, ToolCapability, ToolDescriptor, ToolOrigin,
    ToolRegistry, ToolResult,
};
