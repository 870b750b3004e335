//! Remote-tools agent: a reactive loop whose only tools come from the first
//! configured remote server.

use agentflow_core::error::{Error, Result};
use agentflow_core::gateway::ModelBinding;
use agentflow_core::message::Message;
use agentflow_tools::ToolDispatcher;
use tracing::info;

use super::react::{ReactOutcome, ReactiveLoop};
use crate::prompts::REMOTE_SYSTEM_PROMPT;

#[derive(Clone)]
pub struct RemoteAgent {
    inner: ReactiveLoop,
    server_id: String,
}

impl RemoteAgent {
    /// Local tools on `dispatcher` are dropped; its remote cache must list
    /// at least one server.
    pub fn new(model: ModelBinding, dispatcher: &ToolDispatcher) -> Result<Self> {
        let server_id = dispatcher
            .remote()
            .and_then(|cache| cache.servers().first())
            .map(|server| server.server_id.clone())
            .ok_or_else(|| {
                Error::UnsupportedRequest("remote mode needs at least one configured server".into())
            })?;

        let inner = ReactiveLoop::new(model, dispatcher.remote_only())
            .with_system_prompt(REMOTE_SYSTEM_PROMPT);
        Ok(Self { inner, server_id })
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.inner = self.inner.with_max_iterations(max);
        self
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub async fn run(&self, messages: Vec<Message>, user_id: Option<&str>) -> Result<ReactOutcome> {
        info!(server = %self.server_id, "Remote agent starting");
        self.inner.run(messages, user_id).await
    }
}
