//! Shared test helpers for pattern tests.

use std::sync::{Arc, Mutex};

use agentflow_core::error::ProviderError;
use agentflow_core::gateway::{
    ModelBinding, ModelGateway, ModelRequest, ModelResponse, OutputSchema, StreamChunk,
    StructuredOutput, Usage,
};
use agentflow_core::message::{Message, MessageToolCall};
use agentflow_sandbox::{SandboxBackend, SandboxError, SandboxResponse};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One scripted gateway reply.
#[derive(Clone)]
pub enum Reply {
    Message(Message),
    Structured(StructuredOutput),
    Fail(ProviderError),
}

/// A mock gateway that returns a sequence of scripted replies and records
/// every request it was sent.
///
/// Panics if more calls are made than replies provided.
pub struct SequentialMockGateway {
    replies: Mutex<Vec<Reply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl SequentialMockGateway {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: ModelRequest) -> Reply {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            panic!("SequentialMockGateway: no more replies (call #{n})");
        }
        replies.remove(0)
    }
}

#[async_trait]
impl ModelGateway for SequentialMockGateway {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        match self.next(request) {
            Reply::Message(message) => Ok(response(message)),
            Reply::Structured(StructuredOutput::Raw(text)) => Ok(response(Message::assistant(text))),
            Reply::Structured(StructuredOutput::Value(v)) => {
                Ok(response(Message::assistant(v.to_string())))
            }
            Reply::Fail(e) => Err(e),
        }
    }

    async fn complete_structured(
        &self,
        request: ModelRequest,
        _schema: &OutputSchema,
    ) -> Result<StructuredOutput, ProviderError> {
        match self.next(request) {
            Reply::Structured(output) => Ok(output),
            Reply::Message(message) => Ok(StructuredOutput::Raw(message.content)),
            Reply::Fail(e) => Err(e),
        }
    }

    /// Streams the reply's text word by word, with tool calls in the final chunk.
    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let message = self.complete(request).await?.message;
        let pieces: Vec<String> = message.content.split_inclusive(' ').map(String::from).collect();
        let (tx, rx) = mpsc::channel(pieces.len() + 1);
        for piece in pieces {
            let _ = tx.try_send(Ok(StreamChunk {
                content: Some(piece),
                ..StreamChunk::default()
            }));
        }
        let _ = tx.try_send(Ok(StreamChunk {
            tool_calls: message.tool_calls,
            done: true,
            ..StreamChunk::default()
        }));
        Ok(rx)
    }
}

fn response(message: Message) -> ModelResponse {
    ModelResponse {
        message,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn binding(gateway: Arc<SequentialMockGateway>) -> ModelBinding {
    ModelBinding::new(gateway, "mock-model")
}

/// A plain text reply (no tool calls).
pub fn text_reply(text: &str) -> Reply {
    Reply::Message(Message::assistant(text))
}

/// A reply requesting tool calls, with optional thought content.
pub fn tool_reply(tool_calls: Vec<MessageToolCall>, thought: &str) -> Reply {
    Reply::Message(Message::assistant(thought).with_tool_calls(tool_calls))
}

pub fn structured_reply(value: serde_json::Value) -> Reply {
    Reply::Structured(StructuredOutput::Value(value))
}

pub fn raw_reply(text: &str) -> Reply {
    Reply::Structured(StructuredOutput::Raw(text.into()))
}

/// Helper to create a tool call with a predictable id.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A sandbox backend that replays canned responses and records programs.
pub struct ScriptedSandbox {
    responses: Mutex<Vec<Result<SandboxResponse, SandboxError>>>,
    pub programs: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new(responses: Vec<Result<SandboxResponse, SandboxError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            programs: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SandboxBackend for ScriptedSandbox {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, program: &str) -> Result<SandboxResponse, SandboxError> {
        self.programs.lock().unwrap().push(program.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(SandboxError::Io("no more responses".into()));
        }
        responses.remove(0)
    }
}

/// A successful sandbox run with the given stdout and locals.
pub fn sandbox_ok(stdout: &str, locals: serde_json::Value) -> Result<SandboxResponse, SandboxError> {
    Ok(SandboxResponse {
        stdout: stdout.into(),
        result: Some(serde_json::json!({ "locals": locals })),
        stderr_fault: None,
    })
}
