//! Structured plans for the plan-then-execute loop.
//!
//! A plan maps step ids to ordered lists of tool invocations. Models do not
//! always return the exact shape asked for, so parsing accepts a few
//! variations:
//!
//! - the mapping wrapped as `{"root": {...}}`
//! - a step given as a single invocation object instead of a list
//! - a step given as `null` (treated as empty)
//! - the JSON wrapped in a fenced code block
//!
//! Step order is the order the keys appear in the model's output.

use agentflow_core::gateway::OutputSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Tool names that hand control back to the user instead of running anything.
pub const ASK_USER_TOOLS: [&str; 2] = ["call_user", "ask_user"];

pub fn is_ask_user(tool_name: &str) -> bool {
    ASK_USER_TOOLS.contains(&tool_name)
}

/// One intended tool call within a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,

    /// Any JSON value; non-object arguments are wrapped at dispatch time.
    #[serde(default)]
    pub tool_args: Value,

    /// Why the planner wants this call. Only used in prompts.
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub invocations: Vec<ToolInvocation>,
}

impl PlanStep {
    pub fn asks_user(&self) -> bool {
        self.invocations
            .first()
            .is_some_and(|inv| is_ask_user(&inv.tool_name))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Read a plan out of an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let mut value = value;
        if let Value::Object(map) = &mut value {
            if let Some(root) = map.remove("root") {
                value = root;
            }
        }

        let Value::Object(map) = value else {
            return Err(format!("expected an object of steps, found {}", kind(&value)));
        };

        let mut steps = Vec::with_capacity(map.len());
        for (id, step) in map {
            let invocations = match step {
                Value::Null => Vec::new(),
                Value::Object(_) => vec![invocation(&id, step)?],
                Value::Array(items) => items
                    .into_iter()
                    .map(|item| invocation(&id, item))
                    .collect::<Result<Vec<_>, _>>()?,
                other => {
                    return Err(format!(
                        "step '{id}' must be a list of tool calls, found {}",
                        kind(&other)
                    ));
                }
            };
            steps.push(PlanStep { id, invocations });
        }
        Ok(Self { steps })
    }

    /// Parse plan text returned by a model.
    pub fn parse(text: &str) -> Result<Self, String> {
        let body = strip_fence(text);
        let value: Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
        Self::from_value(value)
    }

    /// Steps that have at least one invocation.
    pub fn runnable_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| !s.invocations.is_empty())
    }

    pub fn total_invocations(&self) -> usize {
        self.steps.iter().map(|s| s.invocations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runnable_steps().next().is_none()
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for step in &self.steps {
            map.insert(step.id.clone(), invocations_value(&step.invocations));
        }
        Value::Object(map)
    }
}

pub fn invocations_value(invocations: &[ToolInvocation]) -> Value {
    serde_json::to_value(invocations).unwrap_or(Value::Array(Vec::new()))
}

/// The schema the planner's structured output must satisfy.
pub fn plan_schema() -> OutputSchema {
    OutputSchema {
        name: "plan_tool_flow".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "root": {
                    "type": "object",
                    "description": "Execution flow. Keys are step names (step_1, step_2, ...), values are the tool calls of that step in order.",
                    "additionalProperties": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "tool_name": {"type": "string", "description": "Name of the tool to call"},
                                "tool_args": {"description": "Arguments for the tool"},
                                "message": {"type": "string", "description": "What this call is for"}
                            },
                            "required": ["tool_name", "tool_args", "message"]
                        }
                    }
                }
            },
            "required": ["root"]
        }),
    }
}

fn invocation(step_id: &str, value: Value) -> Result<ToolInvocation, String> {
    serde_json::from_value(value).map_err(|e| format!("step '{step_id}': {e}"))
}

fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_wrapped_plan_in_key_order() {
        let plan = Plan::parse(
            r#"{"root": {
                "step_2": [{"tool_name": "calculator", "tool_args": {"expression": "1+1"}, "message": "add"}],
                "step_1": [{"tool_name": "get_weather", "tool_args": {"city": "Tokyo"}, "message": "weather"}]
            }}"#,
        )
        .unwrap();

        let ids: Vec<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["step_2", "step_1"]);
        assert_eq!(plan.steps[1].invocations[0].tool_args["city"], "Tokyo");
    }

    #[test]
    fn single_object_step_becomes_one_item_list() {
        let plan = Plan::from_value(json!({
            "step_1": {"tool_name": "current_time", "tool_args": null, "message": "now"}
        }))
        .unwrap();
        assert_eq!(plan.steps[0].invocations.len(), 1);
        assert_eq!(plan.total_invocations(), 1);
    }

    #[test]
    fn empty_steps_are_not_runnable() {
        let plan = Plan::from_value(json!({"step_1": [], "step_2": null})).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.is_empty());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let text = "```json\n{\"step_1\": [{\"tool_name\": \"call_user\", \"tool_args\": {}}]}\n```";
        let plan = Plan::parse(text).unwrap();
        assert!(plan.steps[0].asks_user());
    }

    #[test]
    fn malformed_plans_are_rejected() {
        assert!(Plan::parse("{not json").is_err());
        assert!(Plan::parse("[1, 2]").unwrap_err().contains("a list"));
        assert!(Plan::from_value(json!({"step_1": "get_weather"})).is_err());
        assert!(Plan::from_value(json!({"step_1": [{"tool_args": {}}]})).unwrap_err().contains("step_1"));
    }

    #[test]
    fn ask_user_aliases() {
        assert!(is_ask_user("call_user"));
        assert!(is_ask_user("ask_user"));
        assert!(!is_ask_user("get_weather"));
    }

    #[test]
    fn to_value_preserves_step_order() {
        let plan = Plan::parse(r#"{"b": [], "a": []}"#).unwrap();
        let keys: Vec<String> = plan.to_value().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }
}
