//! Reactive pattern: Think → Act → Observe.
//!
//! The model is called with the whole transcript and the tool definitions.
//! If it requests tools, every request is dispatched in the order received
//! and answered with exactly one tool-result message, then the model is
//! called again. A response without tool calls ends the turn.
//!
//! Tool faults never end the turn: an unknown tool, a failing tool or a
//! timeout all come back as `"<tool> failed: <message>"` results.

use agentflow_core::error::{Error, Result};
use agentflow_core::gateway::ModelBinding;
use agentflow_core::message::{Message, Role};
use agentflow_tools::ToolDispatcher;
use tracing::{debug, info, warn};

use super::{TextSender, think, to_tool_call};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use crate::state::ExecutionState;

pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

/// Answer used when the iteration cap is hit before the model stops calling tools.
pub const ITERATION_LIMIT_ANSWER: &str =
    "I've reached the maximum number of reasoning iterations without a final answer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactStep {
    Think,
    Act,
    End,
}

impl ReactStep {
    /// Transition after a THINK step, decided by the model's response alone.
    pub fn after_think(response: &Message) -> Self {
        if response.has_tool_calls() {
            ReactStep::Act
        } else {
            ReactStep::End
        }
    }
}

/// The result of a reactive run.
#[derive(Debug, Clone)]
pub struct ReactOutcome {
    pub answer: String,
    pub state: ExecutionState,
    /// True when the run stopped at the iteration cap.
    pub hit_limit: bool,
}

#[derive(Clone)]
pub struct ReactiveLoop {
    model: ModelBinding,
    dispatcher: ToolDispatcher,
    system_prompt: Option<String>,
    max_iterations: u32,
}

impl ReactiveLoop {
    pub fn new(model: ModelBinding, dispatcher: ToolDispatcher) -> Self {
        Self {
            model,
            dispatcher,
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Validate the caller's history and make sure it starts with instructions.
    ///
    /// The history must be non-empty and end with a user, assistant or
    /// tool-result message. A system prompt is inserted at the front when the
    /// history has none.
    pub fn prepare_messages(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        match messages.last().map(|m| m.role) {
            Some(Role::User | Role::Assistant | Role::Tool) => {}
            _ => {
                return Err(Error::UnsupportedRequest(
                    "messages must end with a user, assistant or tool message".into(),
                ));
            }
        }

        let mut prepared = messages;
        if !prepared.iter().any(|m| m.role == Role::System) {
            let prompt = self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT);
            prepared.insert(0, Message::system(prompt));
        }
        Ok(prepared)
    }

    pub async fn run(&self, messages: Vec<Message>, user_id: Option<&str>) -> Result<ReactOutcome> {
        self.drive(messages, user_id, None).await
    }

    /// Like [`run`](Self::run), forwarding the model's text as it is generated.
    pub async fn run_streaming(
        &self,
        messages: Vec<Message>,
        user_id: Option<&str>,
        tx: &TextSender,
    ) -> Result<ReactOutcome> {
        self.drive(messages, user_id, Some(tx)).await
    }

    async fn drive(
        &self,
        messages: Vec<Message>,
        user_id: Option<&str>,
        sink: Option<&TextSender>,
    ) -> Result<ReactOutcome> {
        let mut state = ExecutionState::new(self.prepare_messages(messages)?);
        let tools = self.dispatcher.definitions().await;

        info!(
            model = %self.model.model,
            tools = tools.len(),
            max_iter = self.max_iterations,
            "Reactive loop starting"
        );

        let mut step = ReactStep::Think;
        loop {
            match step {
                ReactStep::Think => {
                    if state.tool_call_count >= self.max_iterations {
                        warn!(max_iter = self.max_iterations, "Reactive loop hit iteration cap");
                        return Ok(ReactOutcome {
                            answer: ITERATION_LIMIT_ANSWER.to_string(),
                            state,
                            hit_limit: true,
                        });
                    }
                    debug!(iteration = state.model_call_count, "Reactive think");

                    let response =
                        think(&self.model, state.messages.clone(), tools.clone(), sink).await?;
                    state.record_model_call();
                    step = ReactStep::after_think(&response);
                    if step == ReactStep::Act {
                        let names: Vec<&str> =
                            response.tool_calls.iter().map(|tc| tc.name.as_str()).collect();
                        info!(tools = ?names, "Model requested tools");
                    }
                    state.push(response);
                }
                ReactStep::Act => {
                    let calls = state.last().map(|m| m.tool_calls.clone()).unwrap_or_default();
                    for tc in &calls {
                        let result = self.dispatcher.dispatch(&to_tool_call(tc), user_id).await;
                        state.push(Message::tool_result(&tc.id, &tc.name, result.output));
                    }
                    state.record_tool_round();
                    step = ReactStep::Think;
                }
                ReactStep::End => {
                    info!(
                        model_calls = state.model_call_count,
                        tool_rounds = state.tool_call_count,
                        "Reactive loop completed"
                    );
                    return Ok(ReactOutcome {
                        answer: state.final_content(),
                        state,
                        hit_limit: false,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;
    use agentflow_core::error::ProviderError;
    use agentflow_tools::default_registry;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn reactive(gateway: Arc<SequentialMockGateway>) -> ReactiveLoop {
        ReactiveLoop::new(binding(gateway), ToolDispatcher::new(default_registry()))
    }

    #[test]
    fn transition_depends_only_on_tool_calls() {
        assert_eq!(ReactStep::after_think(&Message::assistant("done")), ReactStep::End);
        let with_call = Message::assistant("")
            .with_tool_calls(vec![make_tool_call("calculator", json!({"expression": "1"}))]);
        assert_eq!(ReactStep::after_think(&with_call), ReactStep::Act);
    }

    #[tokio::test]
    async fn direct_answer_without_tools() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![text_reply("4")]));
        let outcome = reactive(gateway.clone())
            .run(vec![Message::user("2+2?")], None)
            .await
            .unwrap();

        assert_eq!(outcome.answer, "4");
        assert_eq!(outcome.state.tool_call_count, 0);
        assert_eq!(outcome.state.model_call_count, 1);
        assert_eq!(gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![
            tool_reply(
                vec![
                    make_tool_call("calculator", json!({"expression": "6 * 7"})),
                    make_tool_call("get_weather", json!({"city": "Tokyo"})),
                ],
                "Let me check.",
            ),
            text_reply("42, and Tokyo is fine."),
        ]));
        let outcome = reactive(gateway.clone())
            .run(vec![Message::user("6*7 and Tokyo weather?")], None)
            .await
            .unwrap();

        assert_eq!(outcome.answer, "42, and Tokyo is fine.");
        // One round, even though two tools ran.
        assert_eq!(outcome.state.tool_call_count, 1);
        assert_eq!(outcome.state.model_call_count, 2);

        let tool_msgs: Vec<&Message> =
            outcome.state.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_msgs.len(), 2);
        assert_eq!(tool_msgs[0].content, "42");
        assert_eq!(tool_msgs[0].tool_call_id.as_deref(), Some("call_calculator"));
        assert!(tool_msgs[1].content.starts_with("Tokyo: "));

        // Second model call saw both results, in order.
        let second = &gateway.requests()[1];
        assert_eq!(second.messages.last().unwrap().tool_name.as_deref(), Some("get_weather"));
        assert!(!second.tools.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_an_observation() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![
            tool_reply(vec![make_tool_call("teleport", json!({}))], ""),
            text_reply("I can't do that."),
        ]));
        let outcome = reactive(gateway)
            .run(vec![Message::user("beam me up")], None)
            .await
            .unwrap();

        let result = outcome.state.messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(result.content, "teleport failed: Tool not found: teleport");
        assert_eq!(outcome.answer, "I can't do that.");
    }

    #[tokio::test]
    async fn system_prompt_inserted_once() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![text_reply("hi"), text_reply("hi")]));
        let agent = reactive(gateway.clone()).with_system_prompt("Be terse.");

        agent.run(vec![Message::user("hello")], None).await.unwrap();
        let first = &gateway.requests()[0].messages;
        assert_eq!(first[0].role, Role::System);
        assert_eq!(first[0].content, "Be terse.");

        agent
            .run(vec![Message::system("Custom"), Message::user("hello")], None)
            .await
            .unwrap();
        let second = &gateway.requests()[1].messages;
        assert_eq!(second.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(second[0].content, "Custom");
    }

    #[tokio::test]
    async fn rejects_bad_history_before_calling_model() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![]));
        let agent = reactive(gateway.clone());

        let err = agent.run(vec![], None).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedRequest(_)));
        let err = agent.run(vec![Message::system("only rules")], None).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedRequest(_)));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn iteration_cap_returns_fallback() {
        let looping = || tool_reply(vec![make_tool_call("calculator", json!({"expression": "1"}))], "");
        let gateway = Arc::new(SequentialMockGateway::new(vec![looping(), looping()]));
        let outcome = reactive(gateway.clone())
            .with_max_iterations(2)
            .run(vec![Message::user("loop")], None)
            .await
            .unwrap();

        assert!(outcome.hit_limit);
        assert_eq!(outcome.answer, ITERATION_LIMIT_ANSWER);
        assert_eq!(outcome.state.tool_call_count, 2);
        assert_eq!(gateway.call_count(), 2);
        assert!(outcome.state.unresolved_calls().is_empty());
    }

    #[tokio::test]
    async fn gateway_fault_propagates() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![Reply::Fail(
            ProviderError::Network("connection reset".into()),
        )]));
        let err = reactive(gateway).run(vec![Message::user("hi")], None).await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn streaming_forwards_text() {
        let gateway = Arc::new(SequentialMockGateway::new(vec![text_reply("two plus two is four")]));
        let (tx, mut rx) = mpsc::channel(32);
        let outcome = reactive(gateway)
            .run_streaming(vec![Message::user("2+2?")], None, &tx)
            .await
            .unwrap();
        drop(tx);

        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            text.push_str(&chunk.unwrap());
        }
        assert_eq!(text, "two plus two is four");
        assert_eq!(outcome.answer, "two plus two is four");
    }
}
