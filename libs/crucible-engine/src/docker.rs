// Container runtime invocation.
//
// The engine drives the runtime through its CLI: `run` for launches,
// `kill` for out-of-band termination by name, `stats` for memory samples
// and `info` as the availability probe. The trait exists so the dispatch
// machinery can be exercised against a stub runtime; production uses
// `DockerCli`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ExecError;

/// Resource caps enforced on every container launch.
const MEMORY_LIMIT: &str = "--memory=512m";
const CPU_LIMIT: &str = "--cpus=1";
const NETWORK: &str = "--network=none";
const PIDS_LIMIT: &str = "--pids-limit=100";
const NPROC_ULIMIT: &str = "nproc=100";

/// Everything needed to launch one container run.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub container_name: String,
    pub image: String,
    /// Absolute host path mounted at `/code` inside the container.
    pub workspace: PathBuf,
    /// Fragment handed to `sh -c` inside the container.
    pub shell_command: String,
    /// Standard input, delivered through the `INPUT` environment variable.
    pub input: Option<String>,
    pub stop_timeout_secs: u32,
}

#[derive(Debug, Clone)]
pub struct LaunchOutput {
    /// Combined stdout and stderr of the run.
    pub output: String,
    /// Whether the container exited with status zero.
    pub success: bool,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Availability probe; fails fast before any workspace work is done.
    async fn ensure_available(&self) -> Result<(), ExecError>;

    /// Launch a container and block until it exits, capturing its output.
    /// Launch failures of the runtime client itself are errors; a non-zero
    /// container exit is reported through [`LaunchOutput::success`].
    async fn run(&self, spec: &LaunchSpec) -> Result<LaunchOutput, ExecError>;

    /// Force-terminate a named container. Best-effort: the container may
    /// already be gone.
    async fn kill(&self, container_name: &str);

    /// One non-streaming `MemUsage` sample for a named container, in the
    /// runtime's `used / limit` text form.
    async fn memory_sample(&self, container_name: &str) -> Result<String, ExecError>;
}

/// Production runtime backed by the `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ensure_available(&self) -> Result<(), ExecError> {
        let status = Command::new(&self.binary)
            .arg("info")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| ExecError::SandboxUnavailable(err.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(ExecError::SandboxUnavailable(
                "docker daemon is not running or not accessible".to_string(),
            ))
        }
    }

    async fn run(&self, spec: &LaunchSpec) -> Result<LaunchOutput, ExecError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["run", "--rm", "--name", spec.container_name.as_str()])
            .args([MEMORY_LIMIT, CPU_LIMIT, NETWORK, PIDS_LIMIT])
            .args(["--ulimit", NPROC_ULIMIT])
            .arg(format!("--stop-timeout={}", spec.stop_timeout_secs));
        if let Some(input) = &spec.input {
            cmd.arg("-e").arg(format!("INPUT={input}"));
        }
        cmd.arg("-v")
            .arg(format!("{}:/code", spec.workspace.display()))
            .arg(&spec.image)
            .args(["sh", "-c", spec.shell_command.as_str()])
            .stdin(Stdio::null())
            // The client process must not outlive a caller that gave up on
            // the launch; the container itself is killed by name.
            .kill_on_drop(true);

        debug!(container = %spec.container_name, command = %spec.shell_command, "launching container");

        let out = cmd
            .output()
            .await
            .map_err(|err| ExecError::SandboxLaunch(err.to_string()))?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));

        Ok(LaunchOutput {
            output,
            success: out.status.success(),
        })
    }

    async fn kill(&self, container_name: &str) {
        let result = Command::new(&self.binary)
            .args(["kill", container_name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) if status.success() => {}
            Ok(_) => warn!(container = container_name, "docker kill reported failure"),
            Err(err) => warn!(container = container_name, error = %err, "failed to run docker kill"),
        }
    }

    async fn memory_sample(&self, container_name: &str) -> Result<String, ExecError> {
        let out = Command::new(&self.binary)
            .args(["stats", container_name, "--no-stream", "--format", "{{.MemUsage}}"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| ExecError::MetricsUnavailable(err.to_string()))?;
        if !out.status.success() {
            return Err(ExecError::MetricsUnavailable(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}
