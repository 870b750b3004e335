//! ModelGateway trait: the abstraction over model inference.
//!
//! A gateway knows how to send a transcript to a model and get a response
//! back, either as a complete message, as a stream of deltas, or as a value
//! constrained to a JSON schema. Loops never construct gateways themselves;
//! they receive [`ModelBinding`]s at construction time.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// A request sent to a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The transcript
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A named JSON schema that constrains a structured completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// What a structured completion produced.
///
/// Gateways that enforce the schema return `Value`; gateways that cannot
/// (or a model that ignored the constraint) return the raw text so the
/// caller can parse or repair it.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput {
    Value(serde_json::Value),
    Raw(String),
}

/// The core gateway trait.
///
/// The loops call `complete()`, `complete_structured()` or `stream()` without
/// knowing which backend is behind it.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError>;

    /// Send a request whose answer must conform to `schema`.
    ///
    /// Default implementation calls `complete()` and hands back the raw text.
    async fn complete_structured(
        &self,
        request: ModelRequest,
        _schema: &OutputSchema,
    ) -> Result<StructuredOutput, ProviderError> {
        let response = self.complete(request).await?;
        Ok(StructuredOutput::Raw(response.message.content))
    }

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}

/// A gateway bound to one model and its sampling settings.
///
/// Loops receive two of these: one for conversation (planning, code
/// generation, synthesis) and one for tool calling.
#[derive(Clone)]
pub struct ModelBinding {
    gateway: Arc<dyn ModelGateway>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelBinding {
    pub fn new(gateway: Arc<dyn ModelGateway>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    /// Build a request for this binding's model.
    pub fn request(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> ModelRequest {
        ModelRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
            stream: false,
            stop: Vec::new(),
        }
    }

    pub async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<ModelResponse, ProviderError> {
        self.gateway.complete(self.request(messages, tools)).await
    }

    pub async fn complete_structured(
        &self,
        messages: Vec<Message>,
        schema: &OutputSchema,
    ) -> Result<StructuredOutput, ProviderError> {
        self.gateway
            .complete_structured(self.request(messages, Vec::new()), schema)
            .await
    }

    pub async fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let mut request = self.request(messages, tools);
        request.stream = true;
        self.gateway.stream(request).await
    }
}

impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("gateway", &self.gateway.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGateway;

    #[async_trait]
    impl ModelGateway for EchoGateway {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ModelResponse {
                message: Message::assistant(last),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn binding_builds_request() {
        let binding = ModelBinding::new(Arc::new(EchoGateway), "gpt-4o-mini")
            .with_temperature(0.0)
            .with_max_tokens(Some(256));
        let req = binding.request(vec![Message::user("hi")], vec![]);
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.max_tokens, Some(256));
        assert!(req.temperature.abs() < f32::EPSILON);
        assert!(!req.stream);
    }

    #[tokio::test]
    async fn default_structured_falls_back_to_raw() {
        let binding = ModelBinding::new(Arc::new(EchoGateway), "m");
        let schema = OutputSchema {
            name: "plan".into(),
            schema: serde_json::json!({"type": "object"}),
        };
        let out = binding
            .complete_structured(vec![Message::user("{\"a\":1}")], &schema)
            .await
            .unwrap();
        assert_eq!(out, StructuredOutput::Raw("{\"a\":1}".into()));
    }

    #[tokio::test]
    async fn default_stream_yields_single_done_chunk() {
        let binding = ModelBinding::new(Arc::new(EchoGateway), "m");
        let mut rx = binding.stream(vec![Message::user("hello")], vec![]).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("hello"));
        assert!(chunk.done);
        assert!(rx.recv().await.is_none());
    }
}
