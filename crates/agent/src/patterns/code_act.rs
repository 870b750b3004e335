//! Code execution pattern: Think → Execute → Observe.
//!
//! The model answers either with fenced code or with plain text. Code is
//! run in the sandbox together with the turn's context and every local tool
//! that has a sandbox definition; the sandbox's observation goes back to the
//! model as a user message. Plain text ends the turn.
//!
//! Names a script defines become context for later scripts in the same
//! turn. Only names that were not already bound are taken, so a script that
//! reassigns an existing name does not update it.

use agentflow_core::error::Result;
use agentflow_core::gateway::ModelBinding;
use agentflow_core::message::Message;
use agentflow_core::tool::ToolDescriptor;
use agentflow_sandbox::{Binding, Bindings, SandboxExecutor};
use agentflow_tools::ToolDispatcher;
use tracing::{debug, info, warn};

use super::{TextSender, think};
use crate::codeblock::extract_code;
use crate::prompts::code_execution_prompt;
use crate::state::ExecutionState;

/// Final answer when the model ends the turn with nothing to say.
pub const EMPTY_RUN_ANSWER: &str = "Code execution finished with no output.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStep {
    Think,
    Execute,
    End,
}

impl CodeStep {
    /// Transition after a THINK step: a script means execute, no script means done.
    pub fn after_think(script: Option<&str>) -> Self {
        match script {
            Some(_) => CodeStep::Execute,
            None => CodeStep::End,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodeOutcome {
    pub answer: String,
    pub state: ExecutionState,
    pub hit_limit: bool,
}

#[derive(Clone)]
pub struct CodeExecutionLoop {
    model: ModelBinding,
    dispatcher: ToolDispatcher,
    sandbox: SandboxExecutor,
    base_prompt: Option<String>,
    max_iterations: Option<u32>,
}

impl CodeExecutionLoop {
    pub fn new(model: ModelBinding, dispatcher: ToolDispatcher, sandbox: SandboxExecutor) -> Self {
        Self {
            model,
            dispatcher,
            sandbox,
            base_prompt: None,
            max_iterations: None,
        }
    }

    pub fn with_base_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_prompt = Some(prompt.into());
        self
    }

    /// Cap the number of executions. Unbounded by default.
    pub fn with_max_iterations(mut self, max: Option<u32>) -> Self {
        self.max_iterations = max;
        self
    }

    /// Tools the model may call from code, with the source that defines them in the sandbox.
    fn sandbox_tools(&self) -> (Vec<ToolDescriptor>, Vec<(String, String)>) {
        let sources = self.dispatcher.sandbox_sources();
        let descriptors = self
            .dispatcher
            .local()
            .descriptors()
            .into_iter()
            .filter(|d| sources.iter().any(|(name, _)| *name == d.name))
            .collect();
        (descriptors, sources)
    }

    pub fn system_prompt(&self) -> String {
        let (descriptors, _) = self.sandbox_tools();
        code_execution_prompt(self.base_prompt.as_deref(), &descriptors)
    }

    pub async fn run(&self, messages: Vec<Message>) -> Result<CodeOutcome> {
        self.drive(messages, None).await
    }

    pub async fn run_streaming(&self, messages: Vec<Message>, tx: &TextSender) -> Result<CodeOutcome> {
        self.drive(messages, Some(tx)).await
    }

    async fn drive(&self, messages: Vec<Message>, sink: Option<&TextSender>) -> Result<CodeOutcome> {
        let (descriptors, sources) = self.sandbox_tools();
        let prompt = code_execution_prompt(self.base_prompt.as_deref(), &descriptors);
        let mut state = ExecutionState::new(messages);

        info!(
            model = %self.model.model,
            sandbox = self.sandbox.backend_name(),
            tools = descriptors.len(),
            "Code execution loop starting"
        );

        let mut step = CodeStep::Think;
        loop {
            match step {
                CodeStep::Think => {
                    if self.max_iterations.is_some_and(|max| state.tool_call_count >= max) {
                        warn!(max_iter = ?self.max_iterations, "Code execution loop hit iteration cap");
                        return Ok(CodeOutcome {
                            answer: non_empty(state.final_content()),
                            state,
                            hit_limit: true,
                        });
                    }

                    // The code prompt leads; caller system messages follow it unchanged.
                    let mut request = Vec::with_capacity(state.messages.len() + 1);
                    request.push(Message::system(prompt.as_str()));
                    request.extend(state.messages.iter().cloned());

                    let response = think(&self.model, request, Vec::new(), sink).await?;
                    state.record_model_call();
                    state.script = extract_code(&response.content);
                    step = CodeStep::after_think(state.script.as_deref());
                    state.push(response);
                }
                CodeStep::Execute => {
                    let script = state.script.take().unwrap_or_default();
                    let bindings = self.bindings(&state, &sources);
                    debug!(iteration = state.tool_call_count, bindings = bindings.len(), "Executing script");

                    let outcome = self.sandbox.run(&script, &bindings).await;
                    if let Some(fault) = outcome.fault {
                        warn!(?fault, "Script did not complete");
                    }
                    state.merge_context(outcome.new_bindings);
                    state.push(Message::user(outcome.observation));
                    state.record_tool_round();
                    step = CodeStep::Think;
                }
                CodeStep::End => {
                    info!(
                        model_calls = state.model_call_count,
                        executions = state.tool_call_count,
                        context = state.context.len(),
                        "Code execution loop completed"
                    );
                    return Ok(CodeOutcome {
                        answer: non_empty(state.final_content()),
                        state,
                        hit_limit: false,
                    });
                }
            }
        }
    }

    /// The turn's context plus tool definitions. Tools win over context names.
    fn bindings(&self, state: &ExecutionState, sources: &[(String, String)]) -> Bindings {
        let mut bindings: Bindings = state
            .context
            .iter()
            .map(|(name, value)| (name.clone(), Binding::Value(value.clone())))
            .collect();
        for (name, source) in sources {
            bindings.insert(name.clone(), Binding::Callable { source: source.clone() });
        }
        bindings
    }
}

fn non_empty(answer: String) -> String {
    if answer.trim().is_empty() {
        EMPTY_RUN_ANSWER.to_string()
    } else {
        answer
    }
}
