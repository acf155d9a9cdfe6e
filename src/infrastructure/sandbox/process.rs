//! Host-process sandbox.
//!
//! Each execution runs in its own process group so a timeout can take down
//! anything the program forked. On timeout the group receives SIGTERM, gets
//! a grace period, then SIGKILL.

use async_trait::async_trait;
use std::io::Write;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::models::{ExecutionResult, SandboxConfig, NO_EXIT_CODE};
use crate::domain::ports::Sandbox;

/// How a supervised process ended.
pub(crate) enum Waited {
    Exited(ExitStatus),
    TimedOut,
    Failed(std::io::Error),
}

/// A spawned child with its output streams being drained in the background.
pub(crate) struct SupervisedProcess {
    child: Child,
    stdout: JoinHandle<String>,
    stderr: JoinHandle<String>,
}

async fn read_stream<R>(stream: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            debug!(error = %e, "output stream closed early");
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

impl SupervisedProcess {
    /// Spawn `cmd` with piped output, optionally feeding `stdin`.
    pub(crate) async fn spawn(cmd: &mut Command, stdin: Option<&str>) -> std::io::Result<Self> {
        cmd.stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.shutdown().await?;
        }

        let stdout = tokio::spawn(read_stream(child.stdout.take()));
        let stderr = tokio::spawn(read_stream(child.stderr.take()));

        Ok(Self { child, stdout, stderr })
    }

    pub(crate) fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub(crate) async fn wait_for(&mut self, timeout: Duration) -> Waited {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => Waited::Exited(status),
            Ok(Err(e)) => Waited::Failed(e),
            Err(_) => Waited::TimedOut,
        }
    }

    /// Wait up to `grace` for the child to exit, then kill it outright.
    pub(crate) async fn reap(&mut self, grace: Duration) {
        if tokio::time::timeout(grace, self.child.wait()).await.is_err() {
            warn!(pid = ?self.child.id(), "process ignored termination, forcing kill");
            if let Err(e) = self.child.kill().await {
                warn!(error = %e, "failed to kill process");
            }
        }
    }

    /// Collect captured output. Readers are given `grace` to hit EOF.
    pub(crate) async fn into_output(self, grace: Duration) -> (String, String) {
        let stdout = tokio::time::timeout(grace, self.stdout).await;
        let stderr = tokio::time::timeout(grace, self.stderr).await;
        (
            stdout.ok().and_then(Result::ok).unwrap_or_default(),
            stderr.ok().and_then(Result::ok).unwrap_or_default(),
        )
    }
}

/// Send `signal` to the process group led by `pid`.
#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        debug!(pid, error = %e, "signal to process group failed");
    }
}

/// File suffix the interpreter expects for a script.
fn script_suffix(interpreter: &str) -> &'static str {
    if interpreter.contains("python") {
        ".py"
    } else if interpreter.contains("node") {
        ".js"
    } else {
        ""
    }
}

/// Runs programs as child processes of the current host.
#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    interpreter: String,
    grace_period: Duration,
}

impl ProcessSandbox {
    pub fn new(interpreter: impl Into<String>, grace_period: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            grace_period,
        }
    }

    pub fn from_config(config: &SandboxConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            Duration::from_secs(config.grace_period_secs),
        )
    }

    async fn run(&self, mut cmd: Command, timeout: Duration) -> ExecutionResult {
        #[cfg(unix)]
        cmd.process_group(0);

        let mut process = match SupervisedProcess::spawn(&mut cmd, None).await {
            Ok(process) => process,
            Err(e) => {
                warn!(error = %e, "failed to start sandboxed process");
                return ExecutionResult::startup_failure(e.to_string());
            }
        };

        // `Child::id` is gone once the child has been waited on.
        let pid = process.id();
        match process.wait_for(timeout).await {
            Waited::Exited(status) => {
                // Background children may still hold the output pipes open.
                #[cfg(unix)]
                if let Some(pid) = pid {
                    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
                }
                let (stdout, stderr) = process.into_output(self.grace_period).await;
                ExecutionResult::completed(stdout, stderr, status.code().unwrap_or(NO_EXIT_CODE))
            }
            Waited::Failed(e) => ExecutionResult::startup_failure(e.to_string()),
            Waited::TimedOut => {
                warn!(timeout_secs = timeout.as_secs_f64(), "sandboxed process timed out");
                self.terminate(&mut process).await;
                let (stdout, _) = process.into_output(self.grace_period).await;
                ExecutionResult::timed_out(timeout, stdout)
            }
        }
    }

    async fn terminate(&self, process: &mut SupervisedProcess) {
        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            if let Some(pid) = process.id() {
                signal_group(pid, Signal::SIGTERM);
                process.reap(self.grace_period).await;
                signal_group(pid, Signal::SIGKILL);
                return;
            }
        }
        process.reap(Duration::ZERO).await;
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn execute_code(&self, source: &str, timeout: Duration) -> ExecutionResult {
        let script = tempfile::Builder::new()
            .prefix("sandbox-")
            .suffix(script_suffix(&self.interpreter))
            .tempfile()
            .and_then(|mut file| {
                file.write_all(source.as_bytes())?;
                file.flush()?;
                Ok(file)
            });

        let script = match script {
            Ok(file) => file,
            Err(e) => return ExecutionResult::startup_failure(format!("failed to write script: {e}")),
        };

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script.path());
        if let Some(dir) = script.path().parent() {
            cmd.current_dir(dir);
        }

        // `script` stays alive until the process has been reaped
        self.run(cmd, timeout).await
    }

    async fn execute_shell(&self, command: &str, timeout: Duration) -> ExecutionResult {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        self.run(cmd, timeout).await
    }
}
