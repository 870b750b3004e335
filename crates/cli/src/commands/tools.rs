//! `agentflow tools`: List the built-in tools.

use agentflow_core::tool::{ToolCapability, ToolDescriptor};
use agentflow_tools::{ToolDispatcher, default_registry};

pub async fn run() -> anyhow::Result<()> {
    let dispatcher = ToolDispatcher::new(default_registry());
    let descriptors = dispatcher.descriptors().await;
    print!("{}", describe(&descriptors)?);
    Ok(())
}

fn describe(descriptors: &[ToolDescriptor]) -> anyhow::Result<String> {
    let mut out = String::new();
    for tool in descriptors {
        let kind = match tool.capability {
            ToolCapability::Synchronous => "sync",
            ToolCapability::Asynchronous => "async",
        };
        out.push_str(&format!("{} ({kind})\n  {}\n", tool.name, tool.description));
        let schema = serde_json::to_string_pretty(&tool.parameters)?;
        for line in schema.lines() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_every_builtin_with_schema() {
        let dispatcher = ToolDispatcher::new(default_registry());
        let text = describe(&dispatcher.descriptors().await).unwrap();

        assert!(text.contains("calculator (sync)"));
        assert!(text.contains("current_time (sync)"));
        assert!(text.contains("get_weather (async)"));
        assert!(text.contains("\"city\""));
    }
}
