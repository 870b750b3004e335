//! `agentflow run`: Run a single turn.

use std::io::Write;

use agentflow_agent::Engine;
use agentflow_config::AppConfig;
use agentflow_core::message::Message;
use anyhow::Context;
use tracing::warn;

pub async fn run(
    mode: String,
    message: String,
    stream: bool,
    user: Option<String>,
) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    if !config.has_api_key() {
        warn!(
            config = %AppConfig::config_dir().join("config.toml").display(),
            "No API key configured; set AGENTFLOW_API_KEY or OPENAI_API_KEY unless the endpoint needs none"
        );
    }
    if !config.remote.servers.is_empty() {
        warn!(
            servers = config.remote.servers.len(),
            "Remote servers are configured but this binary has no remote tool source; they are ignored"
        );
    }

    let bindings = agentflow_providers::build_from_config(&config)
        .context("Failed to set up model gateway")?;
    let engine = Engine::from_config(&config, bindings.conversation, bindings.tool_call);
    let messages = vec![Message::user(message)];

    if stream {
        let mut rx = engine.stream_as(&mode, messages, user).await?;
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            let text = chunk?;
            write!(stdout, "{text}")?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
    } else {
        let answer = engine.invoke_as(&mode, messages, user.as_deref()).await?;
        println!("{answer}");
    }

    Ok(())
}
