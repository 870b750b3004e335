//! Remote tool cache.
//!
//! Remote tools are discovered once per cache and reused for every turn the
//! owning engine serves. Population runs at most once even when several turns
//! ask for the tools at the same time; a failed discovery leaves the cache
//! empty so the next caller retries.

use std::sync::Arc;

use agentflow_core::error::ToolError;
use agentflow_core::remote::{RemoteServerConfig, RemoteToolSource};
use agentflow_core::tool::ToolDescriptor;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub struct RemoteToolCache {
    source: Arc<dyn RemoteToolSource>,
    servers: Vec<RemoteServerConfig>,
    tools: OnceCell<Vec<ToolDescriptor>>,
}

impl RemoteToolCache {
    pub fn new(source: Arc<dyn RemoteToolSource>, servers: Vec<RemoteServerConfig>) -> Self {
        Self {
            source,
            servers,
            tools: OnceCell::new(),
        }
    }

    pub fn servers(&self) -> &[RemoteServerConfig] {
        &self.servers
    }

    pub fn source(&self) -> &Arc<dyn RemoteToolSource> {
        &self.source
    }

    pub fn is_loaded(&self) -> bool {
        self.tools.initialized()
    }

    /// The discovered tools, fetching them on first use.
    pub async fn tools(&self) -> Result<&[ToolDescriptor], ToolError> {
        let tools = self
            .tools
            .get_or_try_init(|| async {
                let discovered = self.source.discover_tools(&self.servers).await.inspect_err(|e| {
                    warn!(error = %e, servers = self.servers.len(), "Remote tool discovery failed");
                })?;
                info!(
                    servers = self.servers.len(),
                    tools = discovered.len(),
                    "Remote tools discovered"
                );
                Ok::<_, ToolError>(discovered)
            })
            .await?;
        Ok(tools.as_slice())
    }

    /// Look up one discovered tool by name.
    pub async fn find(&self, name: &str) -> Result<Option<ToolDescriptor>, ToolError> {
        Ok(self.tools().await?.iter().find(|t| t.name == name).cloned())
    }

    /// The server that owns `tool_name`, by the descriptor's origin or,
    /// failing that, by the server's advertised tool list.
    pub async fn server_for(&self, tool_name: &str) -> Option<String> {
        if let Ok(Some(descriptor)) = self.find(tool_name).await {
            if let Some(id) = descriptor.server_id() {
                return Some(id.to_string());
            }
        }
        self.servers
            .iter()
            .find(|s| s.tools.iter().any(|t| t == tool_name))
            .map(|s| s.server_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_core::tool::ToolResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl RemoteToolSource for CountingSource {
        async fn discover_tools(
            &self,
            servers: &[RemoteServerConfig],
        ) -> Result<Vec<ToolDescriptor>, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_first && n == 0 {
                return Err(ToolError::Discovery {
                    server_id: servers[0].server_id.clone(),
                    reason: "connection refused".into(),
                });
            }
            Ok(vec![ToolDescriptor::remote(
                "track_parcel",
                "Track a parcel",
                serde_json::json!({"type": "object"}),
                servers[0].server_id.clone(),
            )])
        }

        async fn call_tool(
            &self,
            _server_id: &str,
            _tool_name: &str,
            _arguments: serde_json::Value,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::ok("ok"))
        }
    }

    fn server() -> RemoteServerConfig {
        RemoteServerConfig {
            server_id: "logistics".into(),
            server_name: "Logistics".into(),
            url: "http://localhost:9000/sse".into(),
            transport: "sse".into(),
            tools: vec!["track_parcel".into(), "quote_shipping".into()],
        }
    }

    #[tokio::test]
    async fn concurrent_readers_share_one_discovery() {
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0), fail_first: false });
        let cache = Arc::new(RemoteToolCache::new(source.clone(), vec![server()]));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.tools().await.map(|t| t.len()) }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded());
    }

    #[tokio::test]
    async fn failed_discovery_is_retried() {
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0), fail_first: true });
        let cache = RemoteToolCache::new(source.clone(), vec![server()]);

        assert!(cache.tools().await.is_err());
        assert!(!cache.is_loaded());
        assert_eq!(cache.tools().await.unwrap().len(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_lookup_uses_origin_then_advertised_list() {
        let source = Arc::new(CountingSource { calls: AtomicUsize::new(0), fail_first: false });
        let cache = RemoteToolCache::new(source, vec![server()]);

        assert_eq!(cache.server_for("track_parcel").await.as_deref(), Some("logistics"));
        assert_eq!(cache.server_for("quote_shipping").await.as_deref(), Some("logistics"));
        assert!(cache.server_for("unknown").await.is_none());
    }
}
