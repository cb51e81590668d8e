// Batched execution: N test cases, one container.
//
// Container startup dominates short runs, so a batch materializes every
// test input as a file, generates a POSIX driver script that compiles once
// and runs each case under its own wall-clock cap, and harvests per-case
// output files after the container exits. Inputs and case ids never appear
// inside shell command text: inputs live in files and ids are restricted
// to [A-Za-z0-9_-] by validation.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use crucible_common::types::TestInput;
use tokio::time::Instant as TokioInstant;
use tracing::warn;

use crate::docker::{ContainerRuntime, LaunchSpec};
use crate::error::ExecError;
use crate::metrics;
use crate::registry::LanguageSpec;
use crate::workspace::{make_world_writable, Workspace};

/// Written by the driver into `<id>.out` when a case exceeds its cap.
pub const CASE_TIMEOUT_SENTINEL: &str =
    "Execution timed out. Your code may contain an infinite loop.";

/// Per-case wall-clock cap enforced inside the container via `timeout`.
pub const CASE_TIMEOUT_SECS: u32 = 5;

const STOP_TIMEOUT_SECS: u32 = 5;
const TESTCASE_DIR: &str = "testcases";
const DRIVER_NAME: &str = "run_tests.sh";
const COMPILE_ERROR_FILE: &str = "compile_error.txt";

/// Result of a batch run. Metrics stay structurally separate from the
/// per-case output text so callers can compare raw program output.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Case id to captured output. Every requested id is present.
    pub outputs: HashMap<String, String>,
    /// True when compilation failed; every case then carries the compiler
    /// diagnostics.
    pub compile_error: bool,
    pub memory_used_kb: Option<i64>,
    pub duration_ms: u64,
}

pub struct BatchRunner {
    runtime: Arc<dyn ContainerRuntime>,
    image: String,
}

impl BatchRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: String) -> Self {
        Self { runtime, image }
    }

    /// Run every test case in one container, bounded by `deadline`. The
    /// caller has already written the source file into the workspace.
    pub async fn run(
        &self,
        workspace: &Workspace,
        spec: &LanguageSpec,
        cases: &[TestInput],
        container_name: &str,
        deadline: TokioInstant,
    ) -> Result<BatchOutcome, ExecError> {
        let started = Instant::now();

        let tc_dir = workspace.create_dir(TESTCASE_DIR).await?;
        for case in cases {
            tokio::fs::write(tc_dir.join(format!("{}.in", case.id)), &case.input).await?;
        }
        let driver_path = workspace
            .write_file(DRIVER_NAME, &driver_script(spec, cases))
            .await?;
        make_world_writable(&driver_path).await?;

        let launch = LaunchSpec {
            container_name: container_name.to_string(),
            image: self.image.clone(),
            workspace: workspace.path().to_path_buf(),
            shell_command: format!("cd /code && sh {DRIVER_NAME}"),
            input: None,
            stop_timeout_secs: STOP_TIMEOUT_SECS,
        };

        let run = match tokio::time::timeout_at(deadline, self.runtime.run(&launch)).await {
            Ok(Ok(out)) => out,
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                warn!(container = container_name, "batch deadline expired, killing container");
                self.runtime.kill(container_name).await;
                return Err(ExecError::Timeout);
            }
        };

        // Racy by nature: with `--rm` the container is usually gone by the
        // time we sample, which is fine for a best-effort metric.
        let memory_used_kb = metrics::memory_used_kb(self.runtime.as_ref(), container_name)
            .await
            .ok();

        let mut outcome = harvest(workspace, cases).await?;
        if !run.success && !outcome.compile_error {
            return Err(ExecError::SandboxLaunch(format!(
                "batch container exited abnormally: {}",
                truncated(&run.output, 512)
            )));
        }

        outcome.memory_used_kb = memory_used_kb;
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        Ok(outcome)
    }
}

/// Generate the driver: compile once (diagnostics to `compile_error.txt`,
/// non-zero exit on failure), then run every case in submission order with
/// a per-case `timeout`. Exit code 124 means the cap fired and the output
/// is replaced with the sentinel; any other non-zero exit appends a
/// diagnostic line.
fn driver_script(spec: &LanguageSpec, cases: &[TestInput]) -> String {
    let mut script = String::from("#!/bin/sh\n\n");

    if let Some(compile) = spec.compile {
        let _ = write!(
            script,
            "if ! {compile} > /code/{COMPILE_ERROR_FILE} 2>&1; then\n    exit 1\nfi\nrm -f /code/{COMPILE_ERROR_FILE}\n\n"
        );
    }

    let _ = write!(
        script,
        r#"run_test_case() {{
    id=$1
    timeout {CASE_TIMEOUT_SECS}s sh -c "cat /code/{TESTCASE_DIR}/$id.in | {run}" > /code/{TESTCASE_DIR}/$id.out 2>&1
    exit_code=$?
    if [ $exit_code -eq 124 ]; then
        echo "{CASE_TIMEOUT_SENTINEL}" > /code/{TESTCASE_DIR}/$id.out
    elif [ $exit_code -ne 0 ]; then
        echo "Execution failed with exit code $exit_code" >> /code/{TESTCASE_DIR}/$id.out
    fi
}}

"#,
        run = spec.run,
    );

    for case in cases {
        let _ = writeln!(script, "run_test_case {}", case.id);
    }
    script
}

/// Read per-case results out of the workspace after the container exits.
async fn harvest(workspace: &Workspace, cases: &[TestInput]) -> Result<BatchOutcome, ExecError> {
    let mut outputs = HashMap::with_capacity(cases.len());

    let compile_error_path = workspace.path().join(COMPILE_ERROR_FILE);
    if let Ok(diagnostics) = tokio::fs::read_to_string(&compile_error_path).await {
        for case in cases {
            outputs.insert(case.id.clone(), format!("Compilation error: {diagnostics}"));
        }
        return Ok(BatchOutcome {
            outputs,
            compile_error: true,
            memory_used_kb: None,
            duration_ms: 0,
        });
    }

    let tc_dir = workspace.path().join(TESTCASE_DIR);
    for case in cases {
        let out_path = tc_dir.join(format!("{}.out", case.id));
        let output = match tokio::fs::read_to_string(&out_path).await {
            Ok(text) => text,
            Err(err) => format!("Failed to read output: {err}"),
        };
        outputs.insert(case.id.clone(), output);
    }

    Ok(BatchOutcome {
        outputs,
        compile_error: false,
        memory_used_kb: None,
        duration_ms: 0,
    })
}

fn truncated(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}
