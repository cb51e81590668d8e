use serde::{Deserialize, Serialize};

/// A single-input code execution request as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: Option<String>,
}

/// One test input of a batch execution. The `id` is chosen by the caller,
/// must be unique within the batch, and keys the result map; it also names
/// the `<id>.in` / `<id>.out` files inside the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestInput {
    pub id: String,
    pub input: String,
}

/// A request to run one piece of code against many test inputs inside a
/// single container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchExecuteRequest {
    pub language: String,
    pub code: String,
    pub test_cases: Vec<TestInput>,
}

/// Test case as it appears on the `/submit` wire: input plus the output the
/// submission is judged against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTestCase {
    pub input: String,
    pub expected_output: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub language: String,
    pub code: String,
    pub test_cases: Vec<SubmitTestCase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetrics {
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used_kb: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: String,
    pub timestamp: u64,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ExecutionMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestCaseResult {
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: String,
    pub total_cases: usize,
    pub passed_cases: usize,
    pub results: Vec<TestCaseResult>,
    pub execution_time_ms: u64,
    pub timestamp: u64,
    pub request_id: String,
}
