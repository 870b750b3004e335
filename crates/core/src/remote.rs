//! Remote tool seams.
//!
//! Discovery and transport for remote tool servers live outside this
//! workspace. The core only defines what it consumes: a source that lists and
//! calls remote tools, and an optional provider of per-user credentials that
//! get merged into a remote call's arguments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::tool::{ToolDescriptor, ToolResult};

/// One remote tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteServerConfig {
    pub server_id: String,

    #[serde(default)]
    pub server_name: String,

    pub url: String,

    /// Transport kind understood by the source (e.g. "sse").
    #[serde(default = "default_transport")]
    pub transport: String,

    /// Tool names this server is expected to expose.
    #[serde(default)]
    pub tools: Vec<String>,
}

fn default_transport() -> String {
    "sse".into()
}

/// Lists and invokes tools hosted on remote servers.
#[async_trait]
pub trait RemoteToolSource: Send + Sync {
    async fn discover_tools(
        &self,
        servers: &[RemoteServerConfig],
    ) -> Result<Vec<ToolDescriptor>, ToolError>;

    async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolResult, ToolError>;
}

/// Supplies per-user parameters (API keys, tenant ids) for a remote server.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn user_config(
        &self,
        user_id: &str,
        server_id: &str,
    ) -> Result<Map<String, Value>, ToolError>;
}

/// How injected credentials combine with caller-supplied arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialPolicy {
    /// Injected values replace caller arguments of the same name.
    #[default]
    Overwrite,
    /// Injected values only fill names the caller left unset.
    Additive,
}

impl CredentialPolicy {
    pub fn merge(self, arguments: &mut Map<String, Value>, injected: Map<String, Value>) {
        for (key, value) in injected {
            match self {
                CredentialPolicy::Overwrite => {
                    arguments.insert(key, value);
                }
                CredentialPolicy::Additive => {
                    arguments.entry(key).or_insert(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn overwrite_replaces_caller_values() {
        let mut args = map(json!({"query": "rust", "api_key": "caller"}));
        CredentialPolicy::Overwrite.merge(&mut args, map(json!({"api_key": "server"})));
        assert_eq!(args["api_key"], "server");
        assert_eq!(args["query"], "rust");
    }

    #[test]
    fn additive_keeps_caller_values() {
        let mut args = map(json!({"api_key": "caller"}));
        CredentialPolicy::Additive.merge(&mut args, map(json!({"api_key": "server", "tenant": "t1"})));
        assert_eq!(args["api_key"], "caller");
        assert_eq!(args["tenant"], "t1");
    }

    #[test]
    fn server_config_defaults() {
        let cfg: RemoteServerConfig =
            serde_json::from_value(json!({"server_id": "s1", "url": "http://localhost:9000/sse"})).unwrap();
        assert_eq!(cfg.transport, "sse");
        assert!(cfg.tools.is_empty());
    }

    #[test]
    fn policy_parses_lowercase() {
        let p: CredentialPolicy = serde_json::from_value(json!("additive")).unwrap();
        assert_eq!(p, CredentialPolicy::Additive);
        assert_eq!(CredentialPolicy::default(), CredentialPolicy::Overwrite);
    }
}
