//! Model bindings built from configuration.
//!
//! Both models default to the top-level endpoint and key; either can point
//! somewhere else. Models that share an endpoint and key share one gateway.

use std::collections::HashMap;
use std::sync::Arc;

use agentflow_config::{AppConfig, ModelConfig};
use agentflow_core::error::ProviderError;
use agentflow_core::gateway::{ModelBinding, ModelGateway};
use tracing::debug;

use crate::openai_compat::OpenAiCompatGateway;

/// The two bindings every loop is built from.
#[derive(Debug, Clone)]
pub struct ModelBindings {
    /// Planning, code generation, repair and answer synthesis.
    pub conversation: ModelBinding,
    /// Reactive turns and plan steps.
    pub tool_call: ModelBinding,
}

pub fn build_from_config(config: &AppConfig) -> Result<ModelBindings, ProviderError> {
    let mut gateways: HashMap<(String, String), Arc<dyn ModelGateway>> = HashMap::new();
    let mut bind = |model: &ModelConfig| -> Result<ModelBinding, ProviderError> {
        let url = model.api_url.clone().unwrap_or_else(|| config.api_url.clone());
        let key = model
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let gateway = match gateways.get(&(url.clone(), key.clone())) {
            Some(existing) => existing.clone(),
            None => {
                debug!(url = %url, model = %model.model, "Creating gateway");
                let created: Arc<dyn ModelGateway> =
                    Arc::new(OpenAiCompatGateway::new(gateway_name(&url), url.clone(), key.clone())?);
                gateways.insert((url, key), created.clone());
                created
            }
        };

        Ok(ModelBinding::new(gateway, model.model.clone())
            .with_temperature(model.temperature)
            .with_max_tokens(model.max_tokens))
    };

    Ok(ModelBindings {
        conversation: bind(&config.models.conversation)?,
        tool_call: bind(&config.models.tool_call)?,
    })
}

/// A short label for logs, taken from the endpoint's host.
fn gateway_name(url: &str) -> String {
    let host = url
        .split("://")
        .nth(1)
        .unwrap_or(url)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    match host {
        "api.openai.com" => "openai".into(),
        "openrouter.ai" => "openrouter".into(),
        "localhost" | "127.0.0.1" => "local".into(),
        "" => "custom".into(),
        other => other.to_string(),
    }
}
