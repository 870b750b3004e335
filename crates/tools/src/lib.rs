//! Tool dispatch and built-in tools for agentflow.
//!
//! The [`ToolDispatcher`] is the single place a loop goes to run a tool,
//! whether it lives in the local registry or on a remote server. The
//! built-in tools are small, deterministic capabilities that every loop can
//! exercise offline; each one also carries a Python definition so the code
//! execution loop can call it from inside the sandbox.

pub mod calculator;
pub mod current_time;
pub mod dispatcher;
pub mod remote;
pub mod weather_lookup;

use std::sync::Arc;

use agentflow_core::tool::ToolRegistry;

pub use dispatcher::{ResolvedTool, ToolDispatcher, failure_text};
pub use remote::RemoteToolCache;

/// Create a registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(weather_lookup::WeatherLookupTool));
    registry.register_blocking(Arc::new(calculator::CalculatorTool));
    registry.register_blocking(Arc::new(current_time::CurrentTimeTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_mixes_sync_and_async_tools() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["calculator", "current_time", "get_weather"]);
        assert!(registry.iter().all(|t| t.sandbox_source().is_some()));
    }

    #[tokio::test]
    async fn dispatcher_runs_builtin_calculator() {
        let dispatcher = ToolDispatcher::new(default_registry());
        let result = dispatcher
            .invoke("calculator", serde_json::json!({"expression": "6 * 7"}), None)
            .await
            .unwrap();
        assert_eq!(result.output, "42");
        assert_eq!(dispatcher.sandbox_sources().len(), 3);
    }

    mod sandbox_definitions {
        //! The Python definitions the code loop binds must agree with the
        //! Rust tools the other loops call.

        use std::sync::Arc;

        use agentflow_core::tool::{BlockingTool, LocalTool, Tool};
        use agentflow_sandbox::{
            Binding, Bindings, ProcessSandbox, SandboxExecutor, SandboxOutcome, SandboxPolicy,
            confine,
        };
        use chrono::DateTime;
        use serde_json::{Value, json};

        use crate::{ToolDispatcher, default_registry};

        fn executor() -> Option<SandboxExecutor> {
            let available = std::process::Command::new("python3")
                .arg("--version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false);
            if !available {
                return None;
            }
            let sandbox = if confine::available() {
                ProcessSandbox::python()
            } else {
                ProcessSandbox::python().with_policy(SandboxPolicy::permissive())
            };
            Some(SandboxExecutor::new(Arc::new(sandbox)))
        }

        fn builtin_bindings() -> Bindings {
            ToolDispatcher::new(default_registry())
                .sandbox_sources()
                .into_iter()
                .map(|(name, source)| (name, Binding::Callable { source }))
                .collect()
        }

        async fn run(executor: &SandboxExecutor, script: &str) -> SandboxOutcome {
            let outcome = executor.run(script, &builtin_bindings()).await;
            assert_eq!(outcome.fault, None, "{}", outcome.observation);
            outcome
        }

        async fn rust_data(name: &str, arguments: Value) -> Value {
            let registry = default_registry();
            let result = match registry.get(name).unwrap() {
                LocalTool::Sync(tool) => tool.execute(arguments).unwrap(),
                LocalTool::Async(tool) => tool.execute(arguments).await.unwrap(),
            };
            result.data.unwrap()
        }

        #[tokio::test]
        async fn calculator_matches_the_rust_evaluator() {
            let Some(executor) = executor() else { return };
            let expressions = ["(2 + 3) * 4", "7 / 2 - 0.25", "2 ** 10 % 1000", "-(3 - 10)"];
            let script: String = expressions
                .iter()
                .enumerate()
                .map(|(i, expr)| format!("r{i} = calculator({expr:?})\n"))
                .collect();

            let outcome = run(&executor, &script).await;
            for (i, expr) in expressions.iter().enumerate() {
                let expected = rust_data("calculator", json!({ "expression": expr })).await;
                assert_eq!(
                    outcome.new_bindings[&format!("r{i}")].as_f64(),
                    expected["result"].as_f64(),
                    "{expr}"
                );
            }
        }

        #[tokio::test]
        async fn weather_matches_the_rust_tool() {
            let Some(executor) = executor() else { return };
            let outcome = run(
                &executor,
                "tokyo = get_weather('Tokyo')\nboston = get_weather('Boston', units='imperial')",
            )
            .await;

            let tokyo = rust_data("get_weather", json!({ "city": "Tokyo" })).await;
            let boston =
                rust_data("get_weather", json!({ "city": "Boston", "units": "imperial" })).await;
            assert_eq!(outcome.new_bindings["tokyo"], tokyo);
            assert_eq!(outcome.new_bindings["boston"], boston);
        }

        #[tokio::test]
        async fn current_time_matches_the_rust_tool() {
            let Some(executor) = executor() else { return };
            let outcome = run(&executor, "now = current_time(8)").await;

            let sandboxed = outcome.new_bindings["now"].as_str().unwrap().to_string();
            let host = rust_data("current_time", json!({ "utc_offset_hours": 8 })).await;
            let sandboxed = DateTime::parse_from_rfc3339(&sandboxed).unwrap();
            let host = DateTime::parse_from_rfc3339(host["iso"].as_str().unwrap()).unwrap();

            assert_eq!(sandboxed.offset(), host.offset());
            assert!((host - sandboxed).num_seconds().abs() < 60);
        }
    }
}
