// End-to-end scenarios against a real container runtime.
//
// These need a running docker daemon and the sandbox image built locally,
// so they are `#[ignore]`d; run them with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use crucible_common::config::Config;
use crucible_common::types::{BatchExecuteRequest, ExecuteRequest, TestInput};

use crate::batch::CASE_TIMEOUT_SENTINEL;
use crate::dispatch::Dispatcher;
use crate::docker::DockerCli;
use crate::error::ExecError;
use crate::sandbox::TIMEOUT_SENTINEL;

fn docker_dispatcher(root: &std::path::Path) -> Dispatcher {
    let config = Config {
        sandbox_root: root.to_path_buf(),
        ..Config::default()
    };
    Dispatcher::new(config, Arc::new(DockerCli::new()))
}

#[tokio::test]
#[ignore] // Requires Docker and the sandbox image
async fn test_python_hello_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let dispatcher = docker_dispatcher(root.path());

    let outcome = dispatcher
        .submit_single(ExecuteRequest {
            language: "python".to_string(),
            code: "print('hello')".to_string(),
            input: None,
        })
        .await
        .unwrap();

    assert!(outcome.error.is_none());
    assert_eq!(outcome.output, "hello\n");
}

#[tokio::test]
#[ignore] // Requires Docker and the sandbox image
async fn test_python_echoes_stdin() {
    let root = tempfile::tempdir().unwrap();
    let dispatcher = docker_dispatcher(root.path());

    let request = ExecuteRequest {
        language: "python".to_string(),
        code: "import sys; print(sys.stdin.read(), end='')".to_string(),
        input: Some("abc".to_string()),
    };

    // The echo round-trip is stable across repeated runs.
    for _ in 0..2 {
        let outcome = dispatcher.submit_single(request.clone()).await.unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.output, "abc\n");
    }
}

#[tokio::test]
#[ignore] // Requires Docker and the sandbox image
async fn test_infinite_loop_is_killed_with_sentinel() {
    let root = tempfile::tempdir().unwrap();
    let config = Config {
        sandbox_root: root.path().to_path_buf(),
        exec_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let dispatcher = Dispatcher::new(config, Arc::new(DockerCli::new()));

    let outcome = dispatcher
        .submit_single(ExecuteRequest {
            language: "python".to_string(),
            code: "while True: pass".to_string(),
            input: None,
        })
        .await
        .unwrap();

    assert!(matches!(outcome.error, Some(ExecError::Timeout)));
    assert_eq!(outcome.output, TIMEOUT_SENTINEL);
    // The workspace is gone once the result is delivered.
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore] // Requires Docker and the sandbox image
async fn test_batch_runs_cases_in_one_container() {
    let root = tempfile::tempdir().unwrap();
    let dispatcher = docker_dispatcher(root.path());

    let outcome = dispatcher
        .submit_batch(BatchExecuteRequest {
            language: "python".to_string(),
            code: "print(int(input())*2)".to_string(),
            test_cases: vec![
                TestInput { id: "tc_0".to_string(), input: "3".to_string() },
                TestInput { id: "tc_1".to_string(), input: "10".to_string() },
            ],
        })
        .await
        .unwrap();

    assert!(!outcome.compile_error);
    assert_eq!(outcome.outputs["tc_0"].trim(), "6");
    assert_eq!(outcome.outputs["tc_1"].trim(), "20");
}

#[tokio::test]
#[ignore] // Requires Docker and the sandbox image
async fn test_batch_compile_error_replicated() {
    let root = tempfile::tempdir().unwrap();
    let dispatcher = docker_dispatcher(root.path());

    let outcome = dispatcher
        .submit_batch(BatchExecuteRequest {
            language: "cpp".to_string(),
            code: "int main(){ return".to_string(),
            test_cases: vec![TestInput { id: "tc_0".to_string(), input: String::new() }],
        })
        .await
        .unwrap();

    assert!(outcome.compile_error);
    assert!(outcome.outputs["tc_0"].starts_with("Compilation error:"));
}

#[tokio::test]
#[ignore] // Requires Docker and the sandbox image
async fn test_batch_per_case_timeout_leaves_other_cases_intact() {
    let root = tempfile::tempdir().unwrap();
    let dispatcher = docker_dispatcher(root.path());

    // Input "spin" loops forever and trips the per-case cap; the other
    // case still runs and reports normally.
    let outcome = dispatcher
        .submit_batch(BatchExecuteRequest {
            language: "python".to_string(),
            code: r#"
line = input()
if line == "spin":
    while True: pass
print(line)
"#
            .to_string(),
            test_cases: vec![
                TestInput { id: "tc_0".to_string(), input: "spin".to_string() },
                TestInput { id: "tc_1".to_string(), input: "ok".to_string() },
            ],
        })
        .await
        .unwrap();

    assert!(outcome.outputs["tc_0"].contains(CASE_TIMEOUT_SENTINEL));
    assert_eq!(outcome.outputs["tc_1"].trim(), "ok");
}
