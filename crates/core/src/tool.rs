//! Tool traits: the abstraction over agent capabilities.
//!
//! A tool is either asynchronous ([`Tool`]) or synchronous ([`BlockingTool`]).
//! The shape is recorded once, at registration time, as a
//! [`ToolCapability`] on the tool's [`ToolDescriptor`], so the dispatcher
//! never has to inspect an implementation to decide how to call it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::gateway::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// How a tool is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCapability {
    Synchronous,
    Asynchronous,
}

/// Where a tool lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ToolOrigin {
    Local,
    Remote { server_id: String },
}

/// Everything the loops need to know about a tool without calling it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
    pub capability: ToolCapability,
    pub origin: ToolOrigin,
}

impl ToolDescriptor {
    /// Descriptor for a tool exposed by a remote server. Remote calls are always awaited.
    pub fn remote(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        server_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            capability: ToolCapability::Asynchronous,
            origin: ToolOrigin::Remote {
                server_id: server_id.into(),
            },
        }
    }

    /// The owning remote server, if any.
    pub fn server_id(&self) -> Option<&str> {
        match &self.origin {
            ToolOrigin::Remote { server_id } => Some(server_id),
            ToolOrigin::Local => None,
        }
    }

    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// An asynchronous tool. Awaited directly on the loop's task.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Python source defining a function with this tool's name, used to
    /// re-materialize the tool inside the code sandbox. `None` means the tool
    /// cannot cross the isolation boundary.
    fn sandbox_source(&self) -> Option<String> {
        None
    }
}

/// A synchronous tool. The dispatcher runs it on the blocking worker pool.
pub trait BlockingTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    fn sandbox_source(&self) -> Option<String> {
        None
    }
}

/// A locally registered tool, tagged by shape.
#[derive(Clone)]
pub enum LocalTool {
    Sync(Arc<dyn BlockingTool>),
    Async(Arc<dyn Tool>),
}

impl LocalTool {
    pub fn name(&self) -> &str {
        match self {
            LocalTool::Sync(t) => t.name(),
            LocalTool::Async(t) => t.name(),
        }
    }

    pub fn sandbox_source(&self) -> Option<String> {
        match self {
            LocalTool::Sync(t) => t.sandbox_source(),
            LocalTool::Async(t) => t.sandbox_source(),
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let (description, parameters, capability) = match self {
            LocalTool::Sync(t) => (
                t.description().to_string(),
                t.parameters_schema(),
                ToolCapability::Synchronous,
            ),
            LocalTool::Async(t) => (
                t.description().to_string(),
                t.parameters_schema(),
                ToolCapability::Asynchronous,
            ),
        };
        ToolDescriptor {
            name: self.name().to_string(),
            description,
            parameters,
            capability,
            origin: ToolOrigin::Local,
        }
    }
}

/// A registry of locally available tools, ordered by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, LocalTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), LocalTool::Async(tool));
    }

    /// Register a synchronous tool. Replaces any existing tool with the same name.
    pub fn register_blocking(&mut self, tool: Arc<dyn BlockingTool>) {
        self.tools.insert(tool.name().to_string(), LocalTool::Sync(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&LocalTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalTool> {
        self.tools.values()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(LocalTool::descriptor).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
