//! External command execution.
//!
//! Every stage is a sequence of external commands (cargo, the container
//! engine, the registry client). [`CommandRunner`] is the seam between the
//! gate and the host: [`ProcessRunner`] spawns real processes, tests script
//! their own.

use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::error::RunnerError;

/// A fully rendered command invocation.
#[derive(Clone, Default)]
pub struct CommandSpec {
    /// First element is the executable
    pub argv: Vec<String>,
    /// Variables removed from the inherited environment
    pub env_remove: Vec<String>,
    /// Written to the child's stdin, then stdin is closed
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            ..Self::default()
        }
    }

    pub fn without_env(mut self, names: &[String]) -> Self {
        self.env_remove.extend(names.iter().cloned());
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// A zero timeout means none.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// Space-joined argv, for logs and failure details.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

// stdin may carry a registry token
impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("argv", &self.argv)
            .field("env_remove", &self.env_remove)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; -1 when terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn summary(&self) -> Option<&str> {
        last_line(&self.stderr).or_else(|| last_line(&self.stdout))
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|line| !line.is_empty())
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion.
    ///
    /// A non-zero exit is a successful `Ok` with that exit code; `Err` means
    /// the command could not be run or did not finish in time.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runs commands as child processes of this one.
///
/// On Unix each command leads its own process group. A timed-out command is
/// killed together with everything it started, so a hung `cargo test` does
/// not leave its test binaries running.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let (program, args) = spec.argv.split_first().ok_or(RunnerError::EmptyCommand)?;
        let start = Instant::now();

        let mut command = Command::new(program);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        for name in &spec.env_remove {
            command.env_remove(name);
        }

        tracing::debug!(command = %spec.display(), "Spawning command");

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = child.id();

        if let (Some(input), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = match spec.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(output) => output?,
                Err(_) => {
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                    return Err(RunnerError::Timeout {
                        program: program.clone(),
                        timeout,
                    });
                }
            },
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::new(vec!["echo".to_string(), "hello".to_string()]);
        let output = ProcessRunner.run(&spec).await.expect("run failed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let output = ProcessRunner
            .run(&CommandSpec::new(vec!["false".to_string()]))
            .await
            .expect("run failed");
        assert!(!output.success());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_empty_command() {
        let err = ProcessRunner.run(&CommandSpec::default()).await.unwrap_err();
        assert!(matches!(err, RunnerError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let spec = CommandSpec::new(vec!["valencloud-no-such-binary".to_string()]);
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_stdin_is_delivered() {
        let spec = CommandSpec::new(vec!["cat".to_string()]).with_stdin("s3cret");
        let output = ProcessRunner.run(&spec).await.expect("run failed");
        assert_eq!(output.stdout, "s3cret");
    }

    #[tokio::test]
    async fn test_env_removed() {
        let spec = sh("echo \"${HOME:-unset}\"").without_env(&["HOME".to_string()]);
        let output = ProcessRunner.run(&spec).await.expect("run failed");
        assert_eq!(output.stdout.trim(), "unset");
    }

    #[tokio::test]
    async fn test_timeout_kills_hung_command() {
        let mut spec = sh("sleep 30");
        spec.timeout = Some(Duration::from_millis(100));
        let start = Instant::now();
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_whole_process_group() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pid_file = dir.path().join("grandchild.pid");
        let mut spec = sh(&format!(
            "sleep 30 & echo $! > {}; wait",
            pid_file.display()
        ));
        spec.timeout = Some(Duration::from_millis(500));

        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));

        let pid = std::fs::read_to_string(&pid_file).expect("pid written");
        let status = format!("/proc/{}/status", pid.trim());
        let deadline = Instant::now() + Duration::from_secs(5);
        // gone, or a zombie waiting for its new parent to reap it
        let alive = || {
            std::fs::read_to_string(&status)
                .map(|s| !s.lines().any(|l| l.starts_with("State:") && l.contains('Z')))
                .unwrap_or(false)
        };
        while alive() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive(), "background sleep survived the timeout");
    }

    #[test]
    fn test_zero_timeout_means_none() {
        assert!(sh("true").with_timeout_secs(0).timeout.is_none());
        assert_eq!(
            sh("true").with_timeout_secs(5).timeout,
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_debug_redacts_stdin() {
        let spec = sh("true").with_stdin("s3cret");
        let debug = format!("{:?}", spec);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_summary_prefers_stderr() {
        let output = CommandOutput {
            exit_code: 1,
            stdout: "building\n".to_string(),
            stderr: "error: one\nerror: two\n\n".to_string(),
            duration_ms: 1,
        };
        assert_eq!(output.summary(), Some("error: two"));

        let quiet = CommandOutput {
            stderr: String::new(),
            ..output
        };
        assert_eq!(quiet.summary(), Some("building"));
    }
}
