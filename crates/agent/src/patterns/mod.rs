//! Orchestration loops.
//!
//! 1. **Reactive**: think, call tools, observe, repeat
//! 2. **Code execution**: think, write code, run it in the sandbox, observe
//! 3. **Plan then execute**: plan every step up front, run the steps, synthesize
//! 4. **Remote**: a reactive loop over one remote server's tools
//!
//! The reactive and code loops are explicit state machines whose next step
//! depends only on the model's last response. Loops take their model
//! bindings and dispatcher at construction and keep no state between turns.

pub mod code_act;
pub mod plan_execute;
pub mod react;
pub mod remote;

pub use code_act::{CodeExecutionLoop, CodeOutcome, CodeStep};
pub use plan_execute::{PlanExecuteLoop, PlanOutcome};
pub use react::{ReactOutcome, ReactStep, ReactiveLoop};
pub use remote::RemoteAgent;

#[cfg(test)]
pub(crate) mod test_helpers;

use agentflow_core::error::{Error, ProviderError};
use agentflow_core::gateway::{ModelBinding, ToolDefinition};
use agentflow_core::message::{Message, MessageToolCall};
use agentflow_core::tool::ToolCall;
use tokio::sync::mpsc;
use tracing::warn;

/// Where a streaming turn sends its text. A fatal fault arrives as a final `Err`.
pub type TextSender = mpsc::Sender<Result<String, Error>>;

/// One model call. With a sink, text deltas are forwarded as they arrive and
/// the full message is assembled from the stream.
pub(crate) async fn think(
    model: &ModelBinding,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    sink: Option<&TextSender>,
) -> Result<Message, ProviderError> {
    let Some(tx) = sink else {
        return Ok(model.complete(messages, tools).await?.message);
    };

    let mut rx = model.stream(messages, tools).await?;
    let mut content = String::new();
    let mut tool_calls: Vec<MessageToolCall> = Vec::new();

    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
            content.push_str(&text);
            // The caller may have hung up; the turn still runs to completion.
            let _ = tx.send(Ok(text)).await;
        }
        for tc in chunk.tool_calls {
            if let Some(existing) = tool_calls.iter_mut().find(|t| t.id == tc.id) {
                existing.arguments.push_str(&tc.arguments);
            } else {
                tool_calls.push(tc);
            }
        }
        if chunk.done {
            break;
        }
    }

    Ok(Message::assistant(content).with_tool_calls(tool_calls))
}

/// Turn a model's tool-call request into a dispatchable call. Unparseable
/// argument text is passed through as a string so the tool can report it.
pub(crate) fn to_tool_call(tc: &MessageToolCall) -> ToolCall {
    let arguments = if tc.arguments.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&tc.arguments).unwrap_or_else(|e| {
            warn!(tool = %tc.name, error = %e, "Tool arguments are not valid JSON");
            serde_json::Value::String(tc.arguments.clone())
        })
    };
    ToolCall {
        id: tc.id.clone(),
        name: tc.name.clone(),
        arguments,
    }
}
