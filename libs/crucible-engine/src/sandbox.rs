// Single-input sandbox launches.
//
// One container per job: the workspace is bind-mounted at `/code`, the
// program's standard input travels in the `INPUT` environment variable and
// the language's shell fragment consumes it. The launcher owns deadline
// enforcement; runtime frameworks do not reliably tear down the container
// when the client process dies, so expiry is followed by an explicit
// kill-by-name.

use std::path::Path;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::warn;

use crate::docker::{ContainerRuntime, LaunchSpec};
use crate::error::ExecError;
use crate::registry::LanguageSpec;

/// Substituted for the program output when the job deadline expires.
pub const TIMEOUT_SENTINEL: &str =
    "Execution timed out. Your code may contain an infinite loop or is taking too long to execute.";

const STOP_TIMEOUT_SECS: u32 = 20;

/// Output of one launch attempt. `error` is absent on a clean exit; on a
/// non-zero exit the captured output is still meaningful because it
/// usually carries the compiler or program diagnostics.
#[derive(Debug)]
pub struct RunOutput {
    pub output: String,
    pub error: Option<ExecError>,
}

pub struct SandboxLauncher {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
}

impl SandboxLauncher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: String) -> Self {
        Self { runtime, image }
    }

    /// Run one program against one input, bounded by `deadline`.
    pub async fn run_single(
        &self,
        workspace: &Path,
        spec: &LanguageSpec,
        input: &str,
        container_name: &str,
        deadline: Instant,
    ) -> RunOutput {
        let launch = LaunchSpec {
            container_name: container_name.to_string(),
            image: self.image.clone(),
            workspace: workspace.to_path_buf(),
            shell_command: spec.shell_command(),
            input: Some(input.to_string()),
            stop_timeout_secs: STOP_TIMEOUT_SECS,
        };

        match tokio::time::timeout_at(deadline, self.runtime.run(&launch)).await {
            Ok(Ok(out)) if out.success => RunOutput {
                output: out.output,
                error: None,
            },
            Ok(Ok(out)) => RunOutput {
                output: out.output,
                error: Some(ExecError::RuntimeFailure),
            },
            Ok(Err(err)) => RunOutput {
                output: String::new(),
                error: Some(err),
            },
            Err(_) => {
                warn!(container = container_name, "execution deadline expired, killing container");
                self.runtime.kill(container_name).await;
                RunOutput {
                    output: TIMEOUT_SENTINEL.to_string(),
                    error: Some(ExecError::Timeout),
                }
            }
        }
    }
}
