//! Prompt templates.

use agentflow_core::tool::ToolDescriptor;
use serde_json::Value;

use crate::plan::{ToolInvocation, invocations_value};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools when they help answer the user's request, and answer directly when they do not. When a tool fails, explain what went wrong instead of guessing.";

pub const REMOTE_SYSTEM_PROMPT: &str = "You are an assistant that completes tasks using the tools provided by a remote service. Call the tools you need, then summarize the outcome for the user.";

/// Placeholder content for a plan step whose model call produced no tool calls.
pub const NO_TOOLS_FOUND: &str = "No available tools found";

/// System prompt for the code execution loop. Only tools that can be
/// re-materialized inside the sandbox should be passed in.
pub fn code_execution_prompt(base: Option<&str>, tools: &[ToolDescriptor]) -> String {
    let mut prompt = match base {
        Some(base) if !base.trim().is_empty() => format!("{base}\n\n"),
        _ => String::new(),
    };
    prompt.push_str(
        "You will be given a task to perform. You should output either\n\
         - a Python code snippet that provides the solution to the task, or a step towards the solution. Any output you want to extract from the code should be printed to the console. Code should be output in a fenced code block.\n\
         - text to be shown directly to the user, if you want to ask for more information or provide the final answer.\n\n\
         In addition to the Python Standard Library, you can use the following functions:\n",
    );

    for tool in tools {
        prompt.push_str(&format!(
            "\ndef {}({}):\n    \"\"\"{}\"\"\"\n    ...\n",
            tool.name,
            python_signature(&tool.parameters),
            tool.description
        ));
    }

    prompt.push_str(
        "\n\nVariables defined at the top level of previous code snippets can be referenced in your code.\n\n\
         Reminder: use Python code snippets to call tools",
    );
    prompt
}

/// Render a JSON Schema object's properties as a Python parameter list.
/// Required parameters come first, in schema order.
pub fn python_signature(schema: &Value) -> String {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return String::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut positional = Vec::new();
    let mut optional = Vec::new();
    for (name, prop) in properties {
        let annotation = python_type(prop);
        if required.contains(&name.as_str()) {
            positional.push(format!("{name}: {annotation}"));
        } else {
            let default = prop.get("default").map_or_else(|| "None".to_string(), python_default);
            optional.push(format!("{name}: {annotation} = {default}"));
        }
    }
    positional.extend(optional);
    positional.join(", ")
}

fn python_type(prop: &Value) -> &'static str {
    match prop.get("type").and_then(Value::as_str) {
        Some("string") => "str",
        Some("integer") => "int",
        Some("number") => "float",
        Some("boolean") => "bool",
        Some("array") => "list",
        Some("object") => "dict",
        _ => "Any",
    }
}

fn python_default(value: &Value) -> String {
    match value {
        Value::Null => "None".into(),
        Value::Bool(true) => "True".into(),
        Value::Bool(false) => "False".into(),
        other => other.to_string(),
    }
}

/// A readable summary of one tool's arguments for the planner.
pub fn tool_schema_summary(tool: &ToolDescriptor) -> String {
    format!(
        "{}: {}\narguments: {}",
        tool.name, tool.description, tool.parameters
    )
}

pub fn planning_prompt(user_query: &str, tools: &[ToolDescriptor]) -> String {
    let tools_info = tools
        .iter()
        .map(tool_schema_summary)
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a planner. Break the user's request into ordered steps and decide which tools each step should call.\n\n\
         User request:\n{user_query}\n\n\
         Available tools:\n{tools_info}\n\n\
         Respond with a JSON object whose keys are step names (step_1, step_2, ...) in execution order. \
         Each value is a list of tool calls, each with \"tool_name\", \"tool_args\" and \"message\" (a short reason). \
         Calls within a step may depend only on results of earlier steps. \
         If the request cannot be completed without more information from the user, make the first call of a step \
         use the tool name \"call_user\" and put the question in \"message\". \
         If no tool is needed, return an empty object."
    )
}

pub fn repair_prompt(content: &str, error: &str) -> String {
    format!(
        "The following JSON is malformed and could not be parsed.\n\n\
         Content:\n{content}\n\n\
         Parse error:\n{error}\n\n\
         Return only the corrected JSON, with no explanation and no code fence."
    )
}

pub fn step_prompt(invocations: &[ToolInvocation]) -> String {
    format!(
        "Carry out exactly this step of the plan by calling the listed tools. \
         Use results of earlier steps from the conversation to fill in arguments where needed.\n\n\
         Planned calls:\n{}",
        invocations_value(invocations)
    )
}
