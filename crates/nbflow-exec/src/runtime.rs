//! Subprocess and container runtime primitives.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::ExecError;

/// Captured outcome of a finished (or killed) process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, -1 when killed or terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Short failure description: last non-empty stderr line, then stdout.
    pub fn failure_message(&self) -> String {
        last_line(&self.stderr)
            .or_else(|| last_line(&self.stdout))
            .map(str::to_string)
            .unwrap_or_else(|| format!("Command exited with code {}", self.exit_code))
    }
}

fn last_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).rev().find(|l| !l.is_empty())
}

/// Run `program` with `args`, capturing output.
///
/// A program that cannot be spawned is a setup error. Expiry of
/// `timeout_duration` kills the child and reports `timed_out`.
pub async fn run_process(
    program: &str,
    args: &[String],
    env: &HashMap<String, String>,
    cwd: Option<&Path>,
    timeout_duration: Option<Duration>,
) -> Result<ProcessOutput, ExecError> {
    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    for (k, v) in env {
        cmd.env(k, v);
    }

    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| ExecError::Setup(format!("Failed to spawn {}: {}", program, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Read stdout and stderr concurrently
    let stdout_handle = tokio::spawn(async move {
        let mut output = String::new();
        if let Some(stdout) = stdout {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                output.push_str(&line);
                output.push('\n');
            }
        }
        output
    });

    let stderr_handle = tokio::spawn(async move {
        let mut output = String::new();
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                output.push_str(&line);
                output.push('\n');
            }
        }
        output
    });

    let wait_result = if let Some(duration) = timeout_duration {
        match timeout(duration, child.wait()).await {
            Ok(result) => result,
            Err(_) => {
                let _ = child.kill().await;
                // Grandchildren may still hold the pipes open.
                stdout_handle.abort();
                stderr_handle.abort();
                return Ok(ProcessOutput {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: String::new(),
                    timed_out: true,
                });
            }
        }
    } else {
        child.wait().await
    };

    let status = wait_result?;

    Ok(ProcessOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: stdout_handle.await.unwrap_or_default(),
        stderr: stderr_handle.await.unwrap_or_default(),
        timed_out: false,
    })
}

/// Container to start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Daemon-side container name, the handle used by `stop`.
    pub name: Option<String>,
    pub image: String,
    pub command: Vec<String>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

/// Image to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Full tag, `<owner>/<name>:<version>` or with registry prefix.
    pub tag: String,
    pub dockerfile: String,
    pub context_dir: String,
    pub timeout: Option<Duration>,
}

/// Outcome of a container operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRunResult {
    pub status: i32,
    pub msg: Option<String>,
    pub timed_out: bool,
}

impl ContainerRunResult {
    pub fn ok() -> Self {
        Self {
            status: 0,
            msg: None,
            timed_out: false,
        }
    }

    pub fn failed(status: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: Some(msg.into()),
            timed_out: false,
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self {
            status: -1,
            msg: Some(format!("Execution timed out after {} seconds", after.as_secs())),
            timed_out: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0 && !self.timed_out
    }

    fn from_process(output: ProcessOutput, limit: Option<Duration>) -> Self {
        if output.timed_out {
            return Self::timeout(limit.unwrap_or_default());
        }
        if output.exit_code == 0 {
            return Self::ok();
        }
        Self::failed(output.exit_code, output.failure_message())
    }
}

/// Container run/build primitive.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run a container to completion.
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerRunResult, ExecError>;

    /// Build an image.
    async fn build(&self, spec: &BuildSpec) -> Result<ContainerRunResult, ExecError>;

    /// Push an image to its registry.
    async fn push(&self, tag: &str) -> Result<ContainerRunResult, ExecError>;

    /// Kill a running container by name.
    async fn stop(&self, name: &str) -> Result<ContainerRunResult, ExecError>;
}

/// Container name for an execution.
pub fn container_name(execid: &str) -> String {
    format!("nbflow-{}", execid)
}

const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime backed by the docker CLI.
///
/// Environment values are handed to the docker process itself and forwarded
/// with `-e NAME`, so secrets never appear on the command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments of `docker run` for a spec.
    pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if let Some(name) = &spec.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        let mut names: Vec<&String> = spec.env.keys().collect();
        names.sort();
        for name in names {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerRunResult, ExecError> {
        tracing::debug!(image = %spec.image, timeout = ?spec.timeout, "Running container");
        let output = run_process(
            &self.binary,
            &Self::run_args(spec),
            &spec.env,
            None,
            spec.timeout,
        )
        .await?;
        Ok(ContainerRunResult::from_process(output, spec.timeout))
    }

    async fn build(&self, spec: &BuildSpec) -> Result<ContainerRunResult, ExecError> {
        tracing::debug!(tag = %spec.tag, dockerfile = %spec.dockerfile, "Building image");
        let args = vec![
            "build".to_string(),
            "-t".to_string(),
            spec.tag.clone(),
            "-f".to_string(),
            spec.dockerfile.clone(),
            spec.context_dir.clone(),
        ];
        let output = run_process(&self.binary, &args, &HashMap::new(), None, spec.timeout).await?;
        Ok(ContainerRunResult::from_process(output, spec.timeout))
    }

    async fn push(&self, tag: &str) -> Result<ContainerRunResult, ExecError> {
        let args = vec!["push".to_string(), tag.to_string()];
        let output = run_process(&self.binary, &args, &HashMap::new(), None, None).await?;
        Ok(ContainerRunResult::from_process(output, None))
    }

    async fn stop(&self, name: &str) -> Result<ContainerRunResult, ExecError> {
        tracing::debug!(container = %name, "Killing container");
        let args = vec!["kill".to_string(), name.to_string()];
        let output = run_process(
            &self.binary,
            &args,
            &HashMap::new(),
            None,
            Some(STOP_TIMEOUT),
        )
        .await?;
        Ok(ContainerRunResult::from_process(output, Some(STOP_TIMEOUT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::fs::PermissionsExt;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    /// Stand-in docker binary that appends its arguments to `calls.log`.
    fn fake_docker(dir: &Path) -> String {
        let log = dir.join("calls.log");
        let script = dir.join("docker");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$@\" >> {}\n", log.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.display().to_string()
    }

    #[tokio::test]
    async fn test_process_echo() {
        let output = run_process("bash", &sh("echo 'hello world'"), &HashMap::new(), None, None)
            .await
            .unwrap();

        assert!(output.is_success());
        assert!(output.stdout.contains("hello world"));
    }

    #[tokio::test]
    async fn test_process_exit_code_and_message() {
        let output = run_process("bash", &sh("echo 'OOM' >&2; exit 1"), &HashMap::new(), None, None)
            .await
            .unwrap();

        assert_eq!(output.exit_code, 1);
        assert_eq!(output.failure_message(), "OOM");
    }

    #[tokio::test]
    async fn test_process_env() {
        let mut env = HashMap::new();
        env.insert("MY_VAR".to_string(), "my_value".to_string());

        let output = run_process("bash", &sh("echo $MY_VAR"), &env, None, None).await.unwrap();
        assert!(output.stdout.contains("my_value"));
    }

    #[tokio::test]
    async fn test_process_timeout() {
        let output = run_process(
            "bash",
            &sh("sleep 10"),
            &HashMap::new(),
            None,
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();

        assert!(output.timed_out);
        assert!(!output.is_success());
    }

    #[tokio::test]
    async fn test_process_spawn_failure_is_setup() {
        let err = run_process("/nonexistent/nbflow-bin", &[], &HashMap::new(), None, None)
            .await
            .unwrap_err();
        assert!(err.is_setup());
    }

    #[test]
    fn test_run_args_hide_env_values() {
        let mut env = HashMap::new();
        env.insert("NB_AGENT_PRIVKEY".to_string(), "secret".to_string());
        env.insert("NB_BASE_PATH".to_string(), "/app".to_string());
        let spec = ContainerSpec {
            name: Some(container_name("abc123")),
            image: "acme/churn:0.1".to_string(),
            command: vec!["nbflow-exec-local".to_string()],
            env,
            timeout: None,
        };

        let args = DockerCli::run_args(&spec);
        assert_eq!(
            args,
            vec![
                "run",
                "--rm",
                "--name",
                "nbflow-abc123",
                "-e",
                "NB_AGENT_PRIVKEY",
                "-e",
                "NB_BASE_PATH",
                "acme/churn:0.1",
                "nbflow-exec-local"
            ]
        );
        assert!(!args.iter().any(|a| a == "secret"));
    }

    #[tokio::test]
    async fn test_stop_kills_named_container() {
        let dir = tempfile::tempdir().unwrap();
        let docker = DockerCli::new(fake_docker(dir.path()));

        let result = docker.stop("nbflow-abc123").await.unwrap();
        assert!(result.is_success());

        let calls = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
        assert_eq!(calls, "kill nbflow-abc123\n");
    }

    #[test]
    fn test_run_result_from_process() {
        let out = ProcessOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        };
        let result = ContainerRunResult::from_process(out, Some(Duration::from_secs(30)));
        assert!(result.timed_out);
        assert_eq!(result.msg.as_deref(), Some("Execution timed out after 30 seconds"));

        let out = ProcessOutput {
            exit_code: 137,
            stdout: "step 1\n".to_string(),
            stderr: String::new(),
            timed_out: false,
        };
        let result = ContainerRunResult::from_process(out, None);
        assert_eq!(result.status, 137);
        assert_eq!(result.msg.as_deref(), Some("step 1"));
    }
}
