//! Subprocess sandbox backend.
//!
//! Each program runs in a fresh interpreter process with a cleared
//! environment, a throwaway working directory and a wall-clock timeout. The
//! process is confined according to its [`SandboxPolicy`] and killed if the
//! run is cancelled, times out or prints more than the output cap, so nothing
//! it did outlives the call.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::backend::{SandboxBackend, SandboxError, SandboxResponse};
use crate::confine;
use crate::policy::SandboxPolicy;
use crate::wrapper;

/// Combined stdout and stderr a run may produce before it is killed.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const READ_CHUNK: usize = 8192;

/// Runs programs with an external interpreter reading source from stdin.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    command: Vec<String>,
    timeout: Duration,
    inherit_env: bool,
    policy: SandboxPolicy,
    max_output_bytes: usize,
}

struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: ExitStatus,
}

impl ProcessSandbox {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            timeout: Duration::from_secs(30),
            inherit_env: false,
            policy: SandboxPolicy::default(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// `python3` in isolated mode, program on stdin.
    pub fn python() -> Self {
        Self::new(vec!["python3".into(), "-I".into(), "-".into()])
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_inherit_env(mut self, inherit_env: bool) -> Self {
        self.inherit_env = inherit_env;
        self
    }

    pub fn with_policy(mut self, policy: SandboxPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    fn build_command(&self, workdir: &Path) -> Result<Command, SandboxError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SandboxError::Spawn("empty sandbox command".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if !self.inherit_env {
            cmd.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
            cmd.env("PYTHONIOENCODING", "utf-8");
            cmd.env("PYTHONDONTWRITEBYTECODE", "1");
        }

        confine::apply(&mut cmd, &self.policy, workdir)?;
        Ok(cmd)
    }

    /// Drain both pipes until the child closes them, then reap it.
    async fn collect(&self, child: &mut Child) -> Result<Captured, SandboxError> {
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Io("sandbox stdout unavailable".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::Io("sandbox stderr unavailable".into()))?;

        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut out_chunk = [0u8; READ_CHUNK];
        let mut err_chunk = [0u8; READ_CHUNK];
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                read = stdout.read(&mut out_chunk), if out_open => {
                    match read.map_err(|e| SandboxError::Io(e.to_string()))? {
                        0 => out_open = false,
                        n => out.extend_from_slice(&out_chunk[..n]),
                    }
                }
                read = stderr.read(&mut err_chunk), if err_open => {
                    match read.map_err(|e| SandboxError::Io(e.to_string()))? {
                        0 => err_open = false,
                        n => err.extend_from_slice(&err_chunk[..n]),
                    }
                }
            }

            if out.len() + err.len() > self.max_output_bytes {
                warn!(limit = self.max_output_bytes, "Sandbox output limit exceeded, killing run");
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Sandbox process already gone");
                }
                if let Err(e) = child.wait().await {
                    debug!(error = %e, "Failed to reap sandbox process");
                }
                return Err(SandboxError::OutputLimit(self.max_output_bytes));
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| SandboxError::Io(e.to_string()))?;
        Ok(Captured {
            stdout: out,
            stderr: err,
            status,
        })
    }
}

#[async_trait]
impl SandboxBackend for ProcessSandbox {
    fn name(&self) -> &str {
        "process"
    }

    async fn execute(&self, program: &str) -> Result<SandboxResponse, SandboxError> {
        let workdir = tempfile::tempdir().map_err(|e| SandboxError::Io(e.to_string()))?;
        let mut child = self
            .build_command(workdir.path())?
            .spawn()
            .map_err(|e| SandboxError::Spawn(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Io("sandbox stdin unavailable".into()))?;
        let source = program.to_owned();
        let writer = tokio::spawn(async move {
            stdin.write_all(source.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = match tokio::time::timeout(self.timeout, self.collect(&mut child)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                writer.abort();
                return Err(e);
            }
            Err(_) => {
                writer.abort();
                warn!(timeout_secs = self.timeout.as_secs(), "Sandbox run timed out");
                return Err(SandboxError::Timeout(self.timeout.as_secs()));
            }
        };

        match writer.await {
            Ok(Ok(())) => {}
            // The interpreter may exit before draining stdin; its exit status tells the story.
            Ok(Err(e)) => debug!(error = %e, "Sandbox stdin closed early"),
            Err(e) => return Err(SandboxError::Io(e.to_string())),
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let (own_output, envelope) = wrapper::split_output(&stdout);

        debug!(
            exit_code = output.status.code().unwrap_or(-1),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Sandbox run finished"
        );

        if !output.status.success() {
            let fault = if stderr.is_empty() {
                format!("sandbox exited with {}", output.status)
            } else {
                stderr
            };
            return Ok(SandboxResponse {
                stdout: own_output.to_string(),
                result: None,
                stderr_fault: Some(fault),
            });
        }

        let Some(envelope) = envelope else {
            let fault = if stderr.is_empty() {
                "program exited before reporting a result".to_string()
            } else {
                stderr
            };
            return Ok(SandboxResponse {
                stdout: own_output.to_string(),
                result: None,
                stderr_fault: Some(fault),
            });
        };

        let result = serde_json::from_str(envelope)
            .map_err(|e| SandboxError::Protocol(e.to_string()))?;

        Ok(SandboxResponse {
            stdout: own_output.to_string(),
            result: Some(result),
            stderr_fault: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{SandboxExecutor, SandboxFault};
    use crate::policy::SandboxCapability;
    use crate::snapshot::{Binding, Bindings};
    use serde_json::json;
    use std::sync::Arc;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// A python sandbox, confined when the kernel allows it.
    fn python() -> Option<ProcessSandbox> {
        if !python_available() {
            return None;
        }
        let sandbox = ProcessSandbox::python();
        Some(if confine::available() {
            sandbox
        } else {
            sandbox.with_policy(SandboxPolicy::permissive())
        })
    }

    /// A python sandbox under the default deny-all policy, or nothing when
    /// this host cannot enforce it.
    fn confined_python() -> Option<ProcessSandbox> {
        (python_available() && confine::available()).then(ProcessSandbox::python)
    }

    #[tokio::test]
    async fn empty_command_fails_to_spawn() {
        let sandbox = ProcessSandbox::new(vec![]);
        let err = sandbox.execute("print(1)").await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(_)));
    }

    #[tokio::test]
    async fn missing_interpreter_fails_to_spawn() {
        let sandbox = ProcessSandbox::new(vec!["agentflow-no-such-interpreter".into()])
            .with_policy(SandboxPolicy::permissive());
        let err = sandbox.execute("print(1)").await.unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(_)));
    }

    #[tokio::test]
    async fn deny_all_policy_is_refused_where_it_cannot_be_enforced() {
        if confine::available() {
            return;
        }
        let sandbox = ProcessSandbox::python();
        let err = sandbox.execute("print(1)").await.unwrap_err();
        assert!(matches!(err, SandboxError::Confinement(_)));
    }

    #[tokio::test]
    async fn runs_wrapped_program() {
        let Some(sandbox) = python() else { return };
        let program = wrapper::program("", "x = 2\nprint(x + 1)", &[]);
        let response = sandbox.execute(&program).await.unwrap();
        assert_eq!(response.stdout.trim(), "3");
        assert!(response.stderr_fault.is_none());
        assert_eq!(response.result.unwrap()["locals"]["x"], 2);
    }

    #[tokio::test]
    async fn syntax_error_is_a_runtime_fault() {
        let Some(sandbox) = python() else { return };
        let program = wrapper::program("", "def broken(:\n    pass", &[]);
        let response = sandbox.execute(&program).await.unwrap();
        assert!(response.stderr_fault.unwrap().contains("SyntaxError"));
        assert!(response.result.is_none());
    }

    #[tokio::test]
    async fn environment_is_cleared() {
        let Some(sandbox) = python() else { return };
        // SAFETY: test-only; no other thread in this test reads the variable.
        unsafe { std::env::set_var("AGENTFLOW_SANDBOX_SECRET", "leak") };
        let program = wrapper::program(
            "",
            "import os\nprint(os.environ.get('AGENTFLOW_SANDBOX_SECRET', 'absent'))",
            &[],
        );
        let response = sandbox.execute(&program).await.unwrap();
        assert_eq!(response.stdout.trim(), "absent");
    }

    #[tokio::test]
    async fn long_running_program_times_out() {
        let Some(sandbox) = python() else { return };
        let sandbox = sandbox.with_timeout(Duration::from_millis(300));
        let program = wrapper::program("", "import time\ntime.sleep(5)", &[]);
        let err = sandbox.execute(&program).await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));
    }

    #[tokio::test]
    async fn runaway_output_is_killed_at_the_cap() {
        let Some(sandbox) = python() else { return };
        let sandbox = sandbox
            .with_max_output_bytes(64 * 1024)
            .with_timeout(Duration::from_secs(20));
        let program = wrapper::program("", "while True:\n    print('x' * 10**6)", &[]);

        let started = std::time::Instant::now();
        let err = sandbox.execute(&program).await.unwrap_err();
        assert!(matches!(err, SandboxError::OutputLimit(65536)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn output_under_the_cap_is_kept_whole() {
        let Some(sandbox) = python() else { return };
        let sandbox = sandbox.with_max_output_bytes(64 * 1024);
        let program = wrapper::program("", "print('y' * 1000)", &[]);
        let response = sandbox.execute(&program).await.unwrap();
        assert_eq!(response.stdout.trim().len(), 1000);
    }

    #[tokio::test]
    async fn host_files_are_out_of_reach() {
        let Some(sandbox) = confined_python() else { return };
        let host = tempfile::tempdir().unwrap();
        let secret = host.path().join("host_secret.txt");
        std::fs::write(&secret, "api_key=sk-HOST-SECRET").unwrap();

        let executor = SandboxExecutor::new(Arc::new(sandbox));
        let script = format!("print(open({:?}).read())", secret.display().to_string());
        let outcome = executor.run(&script, &Bindings::new()).await;

        assert!(!outcome.observation.contains("sk-HOST-SECRET"));
        assert!(outcome.observation.contains("Permission denied"), "{}", outcome.observation);
        assert_eq!(outcome.fault, Some(SandboxFault::Program));
    }

    #[tokio::test]
    async fn scratch_directory_stays_writable() {
        let Some(sandbox) = confined_python() else { return };
        let executor = SandboxExecutor::new(Arc::new(sandbox));
        let script = "with open('notes.txt', 'w') as f:\n    f.write('kept')\nprint(open('notes.txt').read())";
        let outcome = executor.run(script, &Bindings::new()).await;
        assert_eq!(outcome.observation, "kept");
    }

    #[tokio::test]
    async fn sockets_are_refused() {
        let Some(sandbox) = confined_python() else { return };
        let executor = SandboxExecutor::new(Arc::new(sandbox));
        let outcome = executor
            .run("import socket\ns = socket.socket()\nprint('socket created')", &Bindings::new())
            .await;
        assert!(!outcome.observation.contains("socket created"));
        assert!(outcome.observation.contains("Operation not permitted"), "{}", outcome.observation);
    }

    #[tokio::test]
    async fn granted_capabilities_are_honoured() {
        let Some(sandbox) = confined_python() else { return };
        let host = tempfile::tempdir().unwrap();
        let shared = host.path().join("shared.txt");
        std::fs::write(&shared, "granted").unwrap();

        let sandbox = sandbox.with_policy(
            SandboxPolicy::default()
                .allow(SandboxCapability::Fs)
                .allow(SandboxCapability::Net),
        );
        let executor = SandboxExecutor::new(Arc::new(sandbox));
        let script = format!(
            "import socket\nsocket.socket().close()\nprint(open({:?}).read())",
            shared.display().to_string()
        );
        let outcome = executor.run(&script, &Bindings::new()).await;
        assert_eq!(outcome.observation, "granted");
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_the_interpreter() {
        let Some(sandbox) = python() else { return };
        let mut bindings = Bindings::new();
        bindings.insert("count".into(), Binding::Value(json!(42)));
        bindings.insert("items".into(), Binding::Value(json!([1, true, null, "xé\"q"])));
        bindings.insert("labels".into(), Binding::Value(json!({"a": [1.5], "b": {}})));
        bindings.insert(
            "double".into(),
            Binding::Callable {
                source: "def double(x):\n    return x * 2\n".into(),
            },
        );

        let executor = SandboxExecutor::new(Arc::new(sandbox));
        let outcome = executor
            .run(
                "print(count, items)\nr = double(count)\nnew = labels['a'][0]",
                &bindings,
            )
            .await;

        assert_eq!(outcome.fault, None, "{}", outcome.observation);
        assert_eq!(outcome.observation, "42 [1, True, None, 'xé\"q']");
        assert_eq!(outcome.new_bindings.len(), 2);
        assert_eq!(outcome.new_bindings["r"], 84);
        assert_eq!(outcome.new_bindings["new"], 1.5);
    }

    #[tokio::test]
    async fn earlier_values_can_be_updated_in_place() {
        let Some(sandbox) = python() else { return };
        let mut bindings = Bindings::new();
        bindings.insert("total".into(), Binding::Value(json!(40)));

        let executor = SandboxExecutor::new(Arc::new(sandbox));
        let outcome = executor.run("total += 2\nprint(total)", &bindings).await;

        assert_eq!(outcome.fault, None, "{}", outcome.observation);
        assert_eq!(outcome.observation, "42");
        assert!(outcome.new_bindings.is_empty());
    }
}
