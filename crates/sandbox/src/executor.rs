//! Turns a script plus bindings into an observation the loop can show the model.
//!
//! Three failure classes are kept apart, and none of them is returned as an
//! `Err`:
//!
//! | class | observation |
//! |---|---|
//! | runtime failed (syntax error, crash) | `Error during execution: <stderr>` |
//! | the script raised | `Error during execution: <message>` |
//! | the call into the sandbox failed | `Error during sandbox execution: <message>` |

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::SandboxBackend;
use crate::snapshot::{self, Bindings};
use crate::wrapper::{self, UNSUPPORTED_TAG};

/// Shown instead of an empty stdout.
pub const NO_OUTPUT: &str = "<Code ran, no output printed to stdout>";

/// Names starting with this are never merged back into the context.
pub const PRIVATE_PREFIX: char = '_';

/// Which of the failure classes a run hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxFault {
    Environment,
    Program,
    Boundary,
}

/// The observation and the bindings a run introduced.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutcome {
    pub observation: String,
    pub new_bindings: BTreeMap<String, Value>,
    pub fault: Option<SandboxFault>,
}

impl SandboxOutcome {
    fn failed(fault: SandboxFault, observation: String) -> Self {
        Self {
            observation,
            new_bindings: BTreeMap::new(),
            fault: Some(fault),
        }
    }
}

#[derive(Clone)]
pub struct SandboxExecutor {
    backend: Arc<dyn SandboxBackend>,
}

impl SandboxExecutor {
    pub fn new(backend: Arc<dyn SandboxBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Run `script` with `bindings` available and report what happened.
    pub async fn run(&self, script: &str, bindings: &Bindings) -> SandboxOutcome {
        let prelude = match snapshot::render(bindings) {
            Ok(prelude) => prelude,
            Err(e) => {
                warn!(error = %e, "Could not snapshot bindings");
                return SandboxOutcome::failed(
                    SandboxFault::Boundary,
                    format!("Error during sandbox execution: {e}"),
                );
            }
        };

        let shared: Vec<&str> = bindings.keys().map(String::as_str).collect();
        let program = wrapper::program(&prelude, script, &shared);
        debug!(
            backend = self.backend.name(),
            bindings = bindings.len(),
            script_bytes = script.len(),
            "Submitting script to sandbox"
        );

        let response = match self.backend.execute(&program).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Sandbox call failed");
                return SandboxOutcome::failed(
                    SandboxFault::Boundary,
                    format!("Error during sandbox execution: {e}"),
                );
            }
        };

        if let Some(stderr) = response.stderr_fault {
            return SandboxOutcome::failed(
                SandboxFault::Environment,
                format!("Error during execution: {stderr}"),
            );
        }

        let envelope = response.result.unwrap_or(Value::Null);
        if let Some(message) = envelope.get("error") {
            let message = message
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| message.to_string());
            return SandboxOutcome::failed(
                SandboxFault::Program,
                format!("Error during execution: {message}"),
            );
        }

        let mut new_bindings = BTreeMap::new();
        if let Some(locals) = envelope.get("locals").and_then(Value::as_object) {
            for (name, value) in locals {
                if bindings.contains_key(name) || name.starts_with(PRIVATE_PREFIX) {
                    continue;
                }
                if let Some(kind) = value.get(UNSUPPORTED_TAG) {
                    debug!(name = %name, kind = %kind, "Dropping local that cannot cross the sandbox boundary");
                    continue;
                }
                new_bindings.insert(name.clone(), value.clone());
            }
        }

        let stdout = response.stdout.trim();
        let observation = if stdout.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            stdout.to_string()
        };

        SandboxOutcome {
            observation,
            new_bindings,
            fault: None,
        }
    }
}
