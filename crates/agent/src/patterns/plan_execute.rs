//! Plan-then-execute pattern.
//!
//! Two phases per turn:
//!
//! 1. **Plan**: the conversation model receives the latest user request and
//!    a schema summary of every available tool, and must answer with a
//!    structured plan (step id → ordered tool invocations). Output that does
//!    not parse gets exactly one repair round; a second failure ends the
//!    turn with a planning error.
//! 2. **Execute**: steps run in plan order. Each step is a single-shot call
//!    to the tool-call model naming only that step's invocations, with the
//!    results of earlier steps as context. A step whose first invocation is
//!    the ask-user tool stops execution and hands control back.
//!
//! The conversation model then synthesizes the answer from the original
//! messages plus everything the steps produced.

use agentflow_core::error::{Error, PlanningError, Result};
use agentflow_core::gateway::{ModelBinding, StructuredOutput};
use agentflow_core::message::{Message, MessageToolCall, Role};
use agentflow_tools::ToolDispatcher;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{TextSender, think, to_tool_call};
use crate::plan::{Plan, PlanStep, invocations_value, plan_schema};
use crate::prompts::{NO_TOOLS_FOUND, planning_prompt, repair_prompt, step_prompt};

/// Name of the synthetic call recorded when a step's model call requested no tools.
pub const NO_TOOL_CALL: &str = "no_available_tool";

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub answer: String,
    pub plan: Plan,
    /// Messages the execute phase appended, in order.
    pub transcript: Vec<Message>,
    /// Steps that made a tool-call model request.
    pub rounds: usize,
    /// True when an ask-user step ended execution early.
    pub asked_user: bool,
}

/// What the execute phase produced.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub transcript: Vec<Message>,
    pub rounds: usize,
    pub asked_user: bool,
}

#[derive(Clone)]
pub struct PlanExecuteLoop {
    conversation: ModelBinding,
    tool_call: ModelBinding,
    dispatcher: ToolDispatcher,
}

impl PlanExecuteLoop {
    pub fn new(conversation: ModelBinding, tool_call: ModelBinding, dispatcher: ToolDispatcher) -> Self {
        Self {
            conversation,
            tool_call,
            dispatcher,
        }
    }

    /// Ask the conversation model for a structured plan.
    pub async fn plan(&self, messages: &[Message]) -> Result<Plan> {
        let user_query = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .or(messages.last())
            .map(|m| m.content.clone())
            .ok_or_else(|| Error::UnsupportedRequest("cannot plan without any messages".into()))?;

        let tools = self.dispatcher.descriptors().await;
        let prompt = planning_prompt(&user_query, &tools);

        let mut call_messages = messages.to_vec();
        match call_messages.first_mut() {
            Some(first) if first.role == Role::System => *first = Message::system(prompt),
            _ => call_messages.insert(0, Message::system(prompt)),
        }

        let output = self
            .conversation
            .complete_structured(call_messages, &plan_schema())
            .await?;

        let (content, parsed) = match output {
            StructuredOutput::Value(value) => (value.to_string(), Plan::from_value(value)),
            StructuredOutput::Raw(text) => {
                let parsed = Plan::parse(&text);
                (text, parsed)
            }
        };

        let plan = match parsed {
            Ok(plan) => plan,
            Err(reason) => {
                warn!(error = %reason, "Plan did not parse, requesting repair");
                self.repair(&content, &reason).await?
            }
        };

        info!(
            steps = plan.steps.len(),
            invocations = plan.total_invocations(),
            "Plan ready"
        );
        Ok(plan)
    }

    async fn repair(&self, content: &str, reason: &str) -> Result<Plan> {
        let response = self
            .conversation
            .complete(vec![Message::user(repair_prompt(content, reason))], Vec::new())
            .await
            .map_err(|e| PlanningError::RepairFailed(e.to_string()))?;

        let repaired = response.message.content;
        Plan::parse(&repaired).map_err(|reason| {
            Error::from(PlanningError::Malformed {
                content: repaired.clone(),
                reason,
            })
        })
    }

    /// Run the plan's steps in order.
    pub async fn execute(&self, plan: &Plan, user_id: Option<&str>) -> Result<Execution> {
        let tools = self.dispatcher.definitions().await;
        let mut execution = Execution::default();

        for step in &plan.steps {
            if step.invocations.is_empty() {
                debug!(step = %step.id, "Skipping empty step");
                continue;
            }
            if step.asks_user() {
                info!(step = %step.id, "Plan hands control back to the user");
                execution
                    .transcript
                    .push(Message::assistant(invocations_value(&step.invocations).to_string()));
                execution.asked_user = true;
                break;
            }
            self.execute_step(step, &tools, user_id, &mut execution).await?;
        }

        info!(
            rounds = execution.rounds,
            messages = execution.transcript.len(),
            "Plan execution finished"
        );
        Ok(execution)
    }

    async fn execute_step(
        &self,
        step: &PlanStep,
        tools: &[agentflow_core::gateway::ToolDefinition],
        user_id: Option<&str>,
        execution: &mut Execution,
    ) -> Result<()> {
        let mut request = Vec::with_capacity(execution.transcript.len() + 1);
        request.push(Message::user(step_prompt(&step.invocations)));
        request.extend(execution.transcript.iter().cloned());

        let response = self.tool_call.complete(request, tools.to_vec()).await?.message;
        execution.rounds += 1;

        if response.has_tool_calls() {
            debug!(step = %step.id, calls = response.tool_calls.len(), "Dispatching step");
            let calls = response.tool_calls.clone();
            execution.transcript.push(response);
            for tc in &calls {
                let result = self.dispatcher.dispatch(&to_tool_call(tc), user_id).await;
                execution
                    .transcript
                    .push(Message::tool_result(&tc.id, &tc.name, result.output));
            }
        } else {
            warn!(step = %step.id, "Step produced no tool calls");
            let placeholder = MessageToolCall::new(NO_TOOL_CALL, &json!({ "step": step.id }));
            let call_id = placeholder.id.clone();
            execution
                .transcript
                .push(Message::assistant(NO_TOOLS_FOUND).with_tool_calls(vec![placeholder]));
            execution
                .transcript
                .push(Message::tool_result(call_id, NO_TOOL_CALL, NO_TOOLS_FOUND));
        }
        Ok(())
    }

    pub async fn run(&self, messages: Vec<Message>, user_id: Option<&str>) -> Result<PlanOutcome> {
        self.drive(messages, user_id, None).await
    }

    /// Like [`run`](Self::run); only the final synthesis is streamed.
    pub async fn run_streaming(
        &self,
        messages: Vec<Message>,
        user_id: Option<&str>,
        tx: &TextSender,
    ) -> Result<PlanOutcome> {
        self.drive(messages, user_id, Some(tx)).await
    }

    async fn drive(
        &self,
        messages: Vec<Message>,
        user_id: Option<&str>,
        sink: Option<&TextSender>,
    ) -> Result<PlanOutcome> {
        info!(
            conversation_model = %self.conversation.model,
            tool_call_model = %self.tool_call.model,
            "Plan-execute loop starting"
        );

        let plan = self.plan(&messages).await?;
        let execution = if plan.is_empty() {
            Execution::default()
        } else {
            self.execute(&plan, user_id).await?
        };

        let mut synthesis = messages;
        synthesis.extend(execution.transcript.iter().cloned());
        let answer = think(&self.conversation, synthesis, Vec::new(), sink)
            .await?
            .content;

        Ok(PlanOutcome {
            answer,
            plan,
            transcript: execution.transcript,
            rounds: execution.rounds,
            asked_user: execution.asked_user,
        })
    }
}
