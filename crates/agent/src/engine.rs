//! Caller-facing surface: pick a mode, hand over a message history, get an
//! answer back (or a stream of text).
//!
//! The engine holds no per-turn state. Every call builds the loop for the
//! requested mode from the shared bindings and runs it to completion.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use agentflow_config::{AppConfig, SandboxConfig};
use agentflow_core::error::{Error, Result};
use agentflow_core::gateway::ModelBinding;
use agentflow_core::message::Message;
use agentflow_core::remote::{
    CredentialPolicy, CredentialProvider, RemoteServerConfig, RemoteToolSource,
};
use agentflow_sandbox::{ProcessSandbox, SandboxCapability, SandboxExecutor, SandboxPolicy};
use agentflow_tools::{RemoteToolCache, ToolDispatcher, default_registry};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::patterns::code_act::EMPTY_RUN_ANSWER;
use crate::patterns::react::DEFAULT_MAX_ITERATIONS;
use crate::patterns::{CodeExecutionLoop, PlanExecuteLoop, ReactiveLoop, RemoteAgent, TextSender};

const STREAM_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentMode {
    Reactive,
    CodeExecution,
    PlanExecute,
    Remote,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Reactive => "reactive",
            AgentMode::CodeExecution => "code_execution",
            AgentMode::PlanExecute => "plan_execute",
            AgentMode::Remote => "remote",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "react" | "reactive" => Ok(AgentMode::Reactive),
            "codeact" | "code_act" | "code_execution" => Ok(AgentMode::CodeExecution),
            "plan_execute" | "planexecute" | "plan" => Ok(AgentMode::PlanExecute),
            "mcp" | "remote" => Ok(AgentMode::Remote),
            _ => Err(Error::UnsupportedRequest(format!("unknown agent mode: {s:?}"))),
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    conversation: ModelBinding,
    tool_call: ModelBinding,
    dispatcher: ToolDispatcher,
    /// Dispatcher over the first remote server only, for remote mode.
    remote: Option<ToolDispatcher>,
    sandbox: SandboxExecutor,
    system_prompt: Option<String>,
    react_max_iterations: u32,
    code_max_iterations: Option<u32>,
}

impl Engine {
    pub fn new(
        conversation: ModelBinding,
        tool_call: ModelBinding,
        dispatcher: ToolDispatcher,
        sandbox: SandboxExecutor,
    ) -> Self {
        Self {
            conversation,
            tool_call,
            dispatcher,
            remote: None,
            sandbox,
            system_prompt: None,
            react_max_iterations: DEFAULT_MAX_ITERATIONS,
            code_max_iterations: None,
        }
    }

    /// Build an engine with the built-in tools and a process sandbox, limits
    /// and prompt taken from `config`.
    pub fn from_config(
        config: &AppConfig,
        conversation: ModelBinding,
        tool_call: ModelBinding,
    ) -> Self {
        let sandbox = ProcessSandbox::new(config.sandbox.command.clone())
            .with_timeout(Duration::from_secs(config.sandbox.timeout_secs))
            .with_inherit_env(config.sandbox.inherit_env)
            .with_policy(sandbox_policy(&config.sandbox))
            .with_max_output_bytes(config.sandbox.max_output_bytes);
        let dispatcher = ToolDispatcher::new(default_registry())
            .with_timeout(Duration::from_secs(config.tools.timeout_secs))
            .with_policy(config.remote.credential_policy);

        let mut engine = Self::new(
            conversation,
            tool_call,
            dispatcher,
            SandboxExecutor::new(Arc::new(sandbox)),
        )
        .with_react_max_iterations(saturating_u32(config.react.max_iterations))
        .with_code_max_iterations(config.code_execution.max_iterations.map(saturating_u32));
        if let Some(prompt) = &config.system_prompt {
            engine = engine.with_system_prompt(prompt.clone());
        }
        engine
    }

    /// Attach remote servers. Every mode sees all of their tools; remote
    /// mode sees only the first server's.
    pub fn with_remote(
        mut self,
        source: Arc<dyn RemoteToolSource>,
        servers: Vec<RemoteServerConfig>,
    ) -> Self {
        self.remote = servers.first().map(|first| {
            let cache = RemoteToolCache::new(source.clone(), vec![first.clone()]);
            self.dispatcher.clone().with_remote(Arc::new(cache)).remote_only()
        });
        self.dispatcher = self
            .dispatcher
            .with_remote(Arc::new(RemoteToolCache::new(source, servers)));
        self
    }

    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.remote = self.remote.map(|d| d.with_credentials(provider.clone()));
        self.dispatcher = self.dispatcher.with_credentials(provider);
        self
    }

    pub fn with_policy(mut self, policy: CredentialPolicy) -> Self {
        self.remote = self.remote.map(|d| d.with_policy(policy));
        self.dispatcher = self.dispatcher.with_policy(policy);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.remote = self.remote.map(|d| d.with_timeout(timeout));
        self.dispatcher = self.dispatcher.with_timeout(timeout);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_react_max_iterations(mut self, max: u32) -> Self {
        self.react_max_iterations = max;
        self
    }

    pub fn with_code_max_iterations(mut self, max: Option<u32>) -> Self {
        self.code_max_iterations = max;
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Run one turn and return the final answer.
    pub async fn invoke(&self, mode: &str, messages: Vec<Message>) -> Result<String> {
        self.invoke_as(mode, messages, None).await
    }

    /// Like [`invoke`](Self::invoke), on behalf of `user_id` (used to look up
    /// remote credentials).
    pub async fn invoke_as(
        &self,
        mode: &str,
        messages: Vec<Message>,
        user_id: Option<&str>,
    ) -> Result<String> {
        let mode: AgentMode = mode.parse()?;
        info!(%mode, messages = messages.len(), "Turn starting");

        match mode {
            AgentMode::Reactive => Ok(self.reactive().run(messages, user_id).await?.answer),
            AgentMode::CodeExecution => Ok(self.code_execution().run(messages).await?.answer),
            AgentMode::PlanExecute => Ok(self.plan_execute().run(messages, user_id).await?.answer),
            AgentMode::Remote => Ok(self.remote_agent()?.run(messages, user_id).await?.answer),
        }
    }

    /// Run one turn, streaming the answer text. An unknown mode or missing
    /// remote configuration is reported here, before anything runs; later
    /// faults arrive as the stream's last item.
    pub async fn stream(
        &self,
        mode: &str,
        messages: Vec<Message>,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        self.stream_as(mode, messages, None).await
    }

    pub async fn stream_as(
        &self,
        mode: &str,
        messages: Vec<Message>,
        user_id: Option<String>,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        let mode: AgentMode = mode.parse()?;
        if mode == AgentMode::Remote {
            self.remote_agent()?;
        }
        info!(%mode, messages = messages.len(), "Streaming turn starting");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.stream_turn(mode, messages, user_id.as_deref(), &tx).await {
                error!(%mode, error = %e, "Streaming turn failed");
                let _ = tx.send(Err(e)).await;
            }
        });
        Ok(rx)
    }

    async fn stream_turn(
        &self,
        mode: AgentMode,
        messages: Vec<Message>,
        user_id: Option<&str>,
        tx: &TextSender,
    ) -> Result<()> {
        match mode {
            AgentMode::Reactive => {
                let outcome = self.reactive().run_streaming(messages, user_id, tx).await?;
                if outcome.hit_limit {
                    let _ = tx.send(Ok(outcome.answer)).await;
                }
            }
            AgentMode::CodeExecution => {
                let outcome = self.code_execution().run_streaming(messages, tx).await?;
                if outcome.answer == EMPTY_RUN_ANSWER {
                    let _ = tx.send(Ok(outcome.answer)).await;
                }
            }
            AgentMode::PlanExecute => {
                self.plan_execute().run_streaming(messages, user_id, tx).await?;
            }
            AgentMode::Remote => {
                let outcome = self.remote_agent()?.run(messages, user_id).await?;
                let _ = tx.send(Ok(outcome.answer)).await;
            }
        }
        Ok(())
    }

    fn reactive(&self) -> ReactiveLoop {
        let agent = ReactiveLoop::new(self.tool_call.clone(), self.dispatcher.clone())
            .with_max_iterations(self.react_max_iterations);
        match &self.system_prompt {
            Some(prompt) => agent.with_system_prompt(prompt.clone()),
            None => agent,
        }
    }

    fn code_execution(&self) -> CodeExecutionLoop {
        let agent = CodeExecutionLoop::new(
            self.conversation.clone(),
            self.dispatcher.clone(),
            self.sandbox.clone(),
        )
        .with_max_iterations(self.code_max_iterations);
        match &self.system_prompt {
            Some(prompt) => agent.with_base_prompt(prompt.clone()),
            None => agent,
        }
    }

    fn plan_execute(&self) -> PlanExecuteLoop {
        PlanExecuteLoop::new(
            self.conversation.clone(),
            self.tool_call.clone(),
            self.dispatcher.clone(),
        )
    }

    fn remote_agent(&self) -> Result<RemoteAgent> {
        let dispatcher = self.remote.as_ref().ok_or_else(|| {
            Error::UnsupportedRequest("remote mode needs at least one configured server".into())
        })?;
        Ok(RemoteAgent::new(self.tool_call.clone(), dispatcher)?
            .with_max_iterations(self.react_max_iterations))
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn sandbox_policy(config: &SandboxConfig) -> SandboxPolicy {
    let mut policy = SandboxPolicy::default();
    if let Some(paths) = &config.read_paths {
        policy = policy.with_read_paths(paths.clone());
    }
    if config.allow_fs {
        policy = policy.allow(SandboxCapability::Fs);
    }
    if config.allow_net {
        policy = policy.allow(SandboxCapability::Net);
    }
    policy
}
