// HTTP route handlers: thin adapters between the wire format and the
// dispatch engine.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use crucible_common::types::{
    BatchExecuteRequest, ExecuteRequest, ExecuteResponse, ExecutionMetrics, SubmitRequest,
    SubmitResponse, TestCaseResult, TestInput,
};
use crucible_engine::{ExecError, CASE_TIMEOUT_SENTINEL};
use serde::Serialize;
use tracing::warn;

use crate::middleware::RequestId;
use crate::AppState;

/// Extra time a caller waits beyond the job's own execution budget before
/// giving up; covers queueing and result delivery.
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// POST /execute — run one program against one optional input.
pub async fn execute(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(req): Json<ExecuteRequest>,
) -> Response {
    let wait_budget = state.config.exec_timeout + WAIT_GRACE;
    let result = tokio::time::timeout(wait_budget, state.dispatcher.submit_single(req)).await;

    match result {
        Err(_) => {
            let err = ExecError::Cancelled;
            error_response(status_for(&err), &err.to_string(), &request_id)
        }
        Ok(Err(err)) => error_response(status_for(&err), &err.to_string(), &request_id),
        Ok(Ok(outcome)) => {
            // The captured output is returned even for failed runs; it
            // carries the compiler or program diagnostics.
            let status_code = match &outcome.error {
                None => StatusCode::OK,
                Some(ExecError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
                Some(ExecError::RuntimeFailure) => StatusCode::OK,
                Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let status = if outcome.error.is_none() { "success" } else { "error" };
            let body = ExecuteResponse {
                output: outcome.output,
                error: outcome.error.as_ref().map(|err| err.to_string()),
                status: status.to_string(),
                timestamp: unix_timestamp(),
                request_id,
                metrics: Some(ExecutionMetrics {
                    execution_time_ms: outcome.duration_ms,
                    memory_used_kb: outcome.memory_used_kb,
                }),
            };
            (status_code, Json(body)).into_response()
        }
    }
}

/// POST /submit — run one program against a list of test cases and judge
/// each raw output against its expectation.
pub async fn submit(
    State(state): State<AppState>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(req): Json<SubmitRequest>,
) -> Response {
    let started = Instant::now();

    // Case ids are assigned here, in submission order; the engine keys its
    // result map by them.
    let batch = BatchExecuteRequest {
        language: req.language.clone(),
        code: req.code.clone(),
        test_cases: req
            .test_cases
            .iter()
            .enumerate()
            .map(|(idx, tc)| TestInput {
                id: format!("tc_{idx}"),
                input: tc.input.clone(),
            })
            .collect(),
    };

    let wait_budget = state.config.batch_timeout + WAIT_GRACE;
    let result = tokio::time::timeout(wait_budget, state.dispatcher.submit_batch(batch)).await;

    match result {
        Err(_) => {
            let err = ExecError::Cancelled;
            error_response(status_for(&err), &err.to_string(), &request_id)
        }
        Ok(Err(
            err @ (ExecError::Validation(_)
            | ExecError::UnsupportedLanguage(_)
            | ExecError::QueueFull),
        )) => error_response(status_for(&err), &err.to_string(), &request_id),
        Ok(Err(ExecError::Timeout)) => {
            replicated_failure(&req, CASE_TIMEOUT_SENTINEL, started, request_id)
        }
        Ok(Err(err)) => {
            warn!(error = %err, "batch execution failed");
            replicated_failure(&req, &format!("Execution error: {err}"), started, request_id)
        }
        Ok(Ok(outcome)) => {
            let mut passed_cases = 0;
            let results: Vec<TestCaseResult> = req
                .test_cases
                .iter()
                .enumerate()
                .map(|(idx, tc)| {
                    let id = format!("tc_{idx}");
                    let actual_output = outcome
                        .outputs
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| "Failed to read output".to_string());
                    let passed = outputs_match(&tc.expected_output, &actual_output);
                    if passed {
                        passed_cases += 1;
                    }
                    TestCaseResult {
                        input: tc.input.clone(),
                        expected_output: tc.expected_output.clone(),
                        actual_output,
                        passed,
                    }
                })
                .collect();

            let body = SubmitResponse {
                status: "success".to_string(),
                total_cases: req.test_cases.len(),
                passed_cases,
                results,
                execution_time_ms: outcome.duration_ms,
                timestamp: unix_timestamp(),
                request_id,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
    }
}

/// Whole-batch failure: every case reports the same diagnostic text.
fn replicated_failure(
    req: &SubmitRequest,
    message: &str,
    started: Instant,
    request_id: String,
) -> Response {
    let results: Vec<TestCaseResult> = req
        .test_cases
        .iter()
        .map(|tc| TestCaseResult {
            input: tc.input.clone(),
            expected_output: tc.expected_output.clone(),
            actual_output: message.to_string(),
            passed: false,
        })
        .collect();
    let body = SubmitResponse {
        status: "error".to_string(),
        total_cases: req.test_cases.len(),
        passed_cases: 0,
        results,
        execution_time_ms: started.elapsed().as_millis() as u64,
        timestamp: unix_timestamp(),
        request_id,
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Pass/fail comparison: surrounding whitespace (spaces, tabs, newlines,
/// carriage returns) is trimmed from both sides, internal whitespace is
/// compared byte for byte.
fn outputs_match(expected: &str, actual: &str) -> bool {
    expected.trim() == actual.trim()
}

fn status_for(err: &ExecError) -> StatusCode {
    match err {
        ExecError::Validation(_) | ExecError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
        ExecError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
        ExecError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ExecError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: String,
    timestamp: u64,
    request_id: String,
}

fn error_response(code: StatusCode, message: &str, request_id: &str) -> Response {
    let body = ErrorBody {
        error: message.to_string(),
        status: "error".to_string(),
        timestamp: unix_timestamp(),
        request_id: request_id.to_string(),
    };
    (code, Json(body)).into_response()
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
