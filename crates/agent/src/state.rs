//! Per-turn working state.
//!
//! An [`ExecutionState`] is created when a loop starts and dropped when it
//! returns. Nothing in it outlives the turn or is shared between turns.

use std::collections::{BTreeMap, BTreeSet};

use agentflow_core::message::{Message, Role};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    /// The transcript: caller history followed by everything this turn added.
    pub messages: Vec<Message>,

    /// Script waiting to be executed (code execution loop only).
    pub script: Option<String>,

    /// Values defined by earlier scripts this turn. Only ever grows.
    pub context: BTreeMap<String, Value>,

    /// Completed act/execute rounds.
    pub tool_call_count: u32,

    pub model_call_count: u32,
}

impl ExecutionState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn record_model_call(&mut self) {
        self.model_call_count += 1;
    }

    pub fn record_tool_round(&mut self) {
        self.tool_call_count += 1;
    }

    /// Add bindings from a script run. Names already in the context are kept as they were.
    pub fn merge_context(&mut self, new_bindings: BTreeMap<String, Value>) {
        for (name, value) in new_bindings {
            self.context.entry(name).or_insert(value);
        }
    }

    /// Call ids requested by the most recent assistant message that have no
    /// tool-result yet. Empty whenever the transcript is ready for a model call.
    pub fn unresolved_calls(&self) -> Vec<String> {
        let Some(pos) = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant && m.has_tool_calls())
        else {
            return Vec::new();
        };

        let answered: BTreeSet<&str> = self.messages[pos + 1..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();

        self.messages[pos]
            .tool_calls
            .iter()
            .filter(|tc| !answered.contains(tc.id.as_str()))
            .map(|tc| tc.id.clone())
            .collect()
    }

    /// Content of the last assistant message, or empty.
    pub fn final_content(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}
