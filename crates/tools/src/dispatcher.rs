//! Tool dispatcher.
//!
//! Resolves a tool name against the local registry first and the remote
//! cache second, then invokes the tool the way its shape requires:
//! asynchronous tools are awaited in place, synchronous tools run on the
//! blocking pool, remote tools go through the [`RemoteToolSource`] with
//! per-user credentials merged into their arguments. Every invocation is
//! bounded by a timeout and leaves one audit line in the log.
//!
//! [`RemoteToolSource`]: agentflow_core::RemoteToolSource

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentflow_core::error::ToolError;
use agentflow_core::gateway::ToolDefinition;
use agentflow_core::remote::{CredentialPolicy, CredentialProvider};
use agentflow_core::tool::{LocalTool, ToolCall, ToolDescriptor, ToolRegistry, ToolResult};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::remote::RemoteToolCache;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A tool name resolved to something callable.
#[derive(Clone)]
pub enum ResolvedTool {
    Local(LocalTool),
    Remote(ToolDescriptor),
}

impl ResolvedTool {
    fn origin_label(&self) -> &'static str {
        match self {
            ResolvedTool::Local(LocalTool::Sync(_)) => "local_sync",
            ResolvedTool::Local(LocalTool::Async(_)) => "local_async",
            ResolvedTool::Remote(_) => "remote",
        }
    }
}

#[derive(Clone)]
pub struct ToolDispatcher {
    local: ToolRegistry,
    remote: Option<Arc<RemoteToolCache>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    policy: CredentialPolicy,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(local: ToolRegistry) -> Self {
        Self {
            local,
            remote: None,
            credentials: None,
            policy: CredentialPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_remote(mut self, cache: Arc<RemoteToolCache>) -> Self {
        self.remote = Some(cache);
        self
    }

    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    pub fn with_policy(mut self, policy: CredentialPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn local(&self) -> &ToolRegistry {
        &self.local
    }

    pub fn remote(&self) -> Option<&Arc<RemoteToolCache>> {
        self.remote.as_ref()
    }

    /// A dispatcher over the remote tools only, sharing this one's cache and credentials.
    pub fn remote_only(&self) -> Self {
        Self {
            local: ToolRegistry::new(),
            ..self.clone()
        }
    }

    /// Every tool available this turn. Local tools shadow remote ones of the
    /// same name; a failed remote discovery leaves only the local tools.
    pub async fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self.local.descriptors();
        let mut seen: BTreeSet<String> = descriptors.iter().map(|d| d.name.clone()).collect();

        if let Some(cache) = &self.remote {
            match cache.tools().await {
                Ok(remote) => {
                    for descriptor in remote {
                        if seen.insert(descriptor.name.clone()) {
                            descriptors.push(descriptor.clone());
                        } else {
                            debug!(tool = %descriptor.name, "Remote tool shadowed by local tool");
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Continuing without remote tools"),
            }
        }
        descriptors
    }

    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        self.descriptors()
            .await
            .iter()
            .map(ToolDescriptor::to_definition)
            .collect()
    }

    /// Local tools that can be re-materialized inside the code sandbox, as
    /// `(name, source)` pairs.
    pub fn sandbox_sources(&self) -> Vec<(String, String)> {
        self.local
            .iter()
            .filter_map(|tool| tool.sandbox_source().map(|src| (tool.name().to_string(), src)))
            .collect()
    }

    pub async fn resolve(&self, name: &str) -> Result<ResolvedTool, ToolError> {
        if let Some(tool) = self.local.get(name) {
            return Ok(ResolvedTool::Local(tool.clone()));
        }
        if let Some(cache) = &self.remote {
            if let Some(descriptor) = cache.find(name).await? {
                return Ok(ResolvedTool::Remote(descriptor));
            }
        }
        Err(ToolError::NotFound(name.to_string()))
    }

    /// Resolve and run one tool, bounded by the dispatcher's timeout.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        user_id: Option<&str>,
    ) -> Result<ToolResult, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&arguments);

        let resolved = match self.resolve(name).await {
            Ok(resolved) => resolved,
            Err(e) => {
                audit(name, "unresolved", "not_found", start, &args_preview);
                return Err(e);
            }
        };
        let origin = resolved.origin_label();

        let result = tokio::time::timeout(
            self.timeout,
            self.run(name, resolved, normalize_arguments(arguments), user_id),
        )
        .await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        audit(name, origin, outcome, start, &args_preview);

        match result {
            Ok(inner) => inner,
            Err(_) => Err(ToolError::Timeout {
                tool_name: name.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Run one tool call and always produce a result. Failures become
    /// `"<tool> failed: <message>"` with `success == false`.
    pub async fn dispatch(&self, call: &ToolCall, user_id: Option<&str>) -> ToolResult {
        match self.invoke(&call.name, call.arguments.clone(), user_id).await {
            Ok(mut result) => {
                result.call_id = call.id.clone();
                result
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolResult {
                    call_id: call.id.clone(),
                    success: false,
                    output: failure_text(&call.name, &e),
                    data: None,
                }
            }
        }
    }

    async fn run(
        &self,
        name: &str,
        resolved: ResolvedTool,
        mut arguments: Map<String, Value>,
        user_id: Option<&str>,
    ) -> Result<ToolResult, ToolError> {
        match resolved {
            ResolvedTool::Local(LocalTool::Async(tool)) => tool.execute(Value::Object(arguments)).await,
            ResolvedTool::Local(LocalTool::Sync(tool)) => {
                let tool_name = name.to_string();
                tokio::task::spawn_blocking(move || tool.execute(Value::Object(arguments)))
                    .await
                    .map_err(|e| ToolError::ExecutionFailed {
                        tool_name,
                        reason: format!("tool panicked: {e}"),
                    })?
            }
            ResolvedTool::Remote(descriptor) => {
                let cache = self
                    .remote
                    .as_ref()
                    .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
                let server_id = match descriptor.server_id() {
                    Some(id) => id.to_string(),
                    None => cache
                        .server_for(name)
                        .await
                        .ok_or_else(|| ToolError::NotFound(name.to_string()))?,
                };

                match (&self.credentials, user_id) {
                    (Some(provider), Some(user)) => {
                        let injected = provider.user_config(user, &server_id).await?;
                        debug!(
                            tool = %name,
                            server_id = %server_id,
                            injected = injected.len(),
                            "Merging per-user remote configuration"
                        );
                        self.policy.merge(&mut arguments, injected);
                    }
                    (Some(_), None) => {
                        debug!(tool = %name, "No user id for remote call, skipping credential injection");
                    }
                    (None, _) => {}
                }

                cache
                    .source()
                    .call_tool(&server_id, name, Value::Object(arguments))
                    .await
            }
        }
    }
}

/// The text a failed tool call leaves in the transcript.
pub fn failure_text(tool_name: &str, error: &ToolError) -> String {
    format!("{tool_name} failed: {error}")
}

/// Tool arguments are always a mapping; anything else is wrapped as `input`.
fn normalize_arguments(arguments: Value) -> Map<String, Value> {
    match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".into(), other);
            map
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

fn audit(tool: &str, origin: &str, outcome: &str, start: Instant, args_preview: &str) {
    info!(
        event = "tool_audit",
        tool = %tool,
        origin = %origin,
        outcome = %outcome,
        duration_ms = start.elapsed().as_millis() as u64,
        args_preview = %args_preview,
        "tool"
    );
}
