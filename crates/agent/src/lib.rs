//! Orchestration for agentflow.
//!
//! A turn takes a message history and drives one of three loops until the
//! model produces a final answer:
//!
//! 1. **Reactive**: the model calls tools directly; results go back as
//!    tool-result messages
//! 2. **Code execution**: the model writes code that runs in a sandbox where
//!    the tools are callable; the output goes back as a user message
//! 3. **Plan then execute**: the model plans every step up front as
//!    structured output, each step runs as one tool-calling request, and the
//!    model synthesizes the answer from the results
//!
//! A fourth mode runs the reactive loop over one remote server's tools.
//! [`Engine`] is the entry point: `invoke` returns the answer, `stream`
//! returns it as a sequence of text chunks.

pub mod codeblock;
pub mod engine;
pub mod patterns;
pub mod plan;
pub mod prompts;
pub mod state;

pub use engine::{AgentMode, Engine};
pub use patterns::{
    CodeExecutionLoop, CodeOutcome, CodeStep, PlanExecuteLoop, PlanOutcome, ReactOutcome,
    ReactStep, ReactiveLoop, RemoteAgent, TextSender,
};
pub use plan::{Plan, PlanStep, ToolInvocation};
pub use state::ExecutionState;
