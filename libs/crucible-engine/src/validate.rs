// Request validation.
//
// Every check here runs before a job is enqueued; a request that fails
// validation never reaches the dispatch queue and never touches the
// filesystem.

use crucible_common::types::{BatchExecuteRequest, ExecuteRequest};

use crate::error::ExecError;
use crate::registry::LanguageRegistry;

pub const MAX_CODE_BYTES: usize = 1024 * 1024;
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;
pub const MAX_BATCH_CASES: usize = 100;
const MAX_CASE_ID_LEN: usize = 64;

pub fn validate_execute(
    registry: &LanguageRegistry,
    req: &ExecuteRequest,
) -> Result<(), ExecError> {
    registry.resolve(&req.language)?;
    validate_code(&req.code)?;
    if let Some(input) = &req.input {
        if input.len() > MAX_INPUT_BYTES {
            return Err(ExecError::Validation(format!(
                "input size exceeds maximum of {MAX_INPUT_BYTES} bytes"
            )));
        }
    }
    Ok(())
}

pub fn validate_batch(
    registry: &LanguageRegistry,
    req: &BatchExecuteRequest,
) -> Result<(), ExecError> {
    registry.resolve(&req.language)?;
    validate_code(&req.code)?;

    if req.test_cases.is_empty() {
        return Err(ExecError::Validation(
            "at least one test case is required".to_string(),
        ));
    }
    if req.test_cases.len() > MAX_BATCH_CASES {
        return Err(ExecError::Validation(format!(
            "too many test cases, maximum allowed: {MAX_BATCH_CASES}"
        )));
    }

    let mut seen = std::collections::HashSet::new();
    for tc in &req.test_cases {
        validate_case_id(&tc.id)?;
        if !seen.insert(tc.id.as_str()) {
            return Err(ExecError::Validation(format!(
                "duplicate test case id: {}",
                tc.id
            )));
        }
        if tc.input.len() > MAX_INPUT_BYTES {
            return Err(ExecError::Validation(format!(
                "test case {} input exceeds maximum of {MAX_INPUT_BYTES} bytes",
                tc.id
            )));
        }
    }
    Ok(())
}

fn validate_code(code: &str) -> Result<(), ExecError> {
    if code.is_empty() {
        return Err(ExecError::Validation("code cannot be empty".to_string()));
    }
    if code.len() > MAX_CODE_BYTES {
        return Err(ExecError::Validation(format!(
            "code size exceeds maximum of {MAX_CODE_BYTES} bytes"
        )));
    }
    Ok(())
}

// Case ids name workspace files and are passed as arguments inside the
// generated driver script, so the accepted alphabet stays strict.
fn validate_case_id(id: &str) -> Result<(), ExecError> {
    if id.is_empty() || id.len() > MAX_CASE_ID_LEN {
        return Err(ExecError::Validation(format!(
            "test case id must be 1..={MAX_CASE_ID_LEN} characters"
        )));
    }
    if !id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ExecError::Validation(format!(
            "test case id {id:?} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_common::types::TestInput;

    fn registry() -> LanguageRegistry {
        LanguageRegistry::builtin()
    }

    fn execute_req(language: &str, code: String) -> ExecuteRequest {
        ExecuteRequest {
            language: language.to_string(),
            code,
            input: None,
        }
    }

    fn batch_req(cases: Vec<TestInput>) -> BatchExecuteRequest {
        BatchExecuteRequest {
            language: "python".to_string(),
            code: "print(input())".to_string(),
            test_cases: cases,
        }
    }

    fn case(id: &str) -> TestInput {
        TestInput {
            id: id.to_string(),
            input: String::new(),
        }
    }

    #[test]
    fn test_code_size_boundary() {
        let at_limit = execute_req("python", "a".repeat(MAX_CODE_BYTES));
        assert!(validate_execute(&registry(), &at_limit).is_ok());

        let over_limit = execute_req("python", "a".repeat(MAX_CODE_BYTES + 1));
        assert!(matches!(
            validate_execute(&registry(), &over_limit),
            Err(ExecError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_code_rejected() {
        let req = execute_req("python", String::new());
        assert!(matches!(
            validate_execute(&registry(), &req),
            Err(ExecError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_language_rejected() {
        let req = execute_req("cobol", "DISPLAY 'x'".to_string());
        assert!(matches!(
            validate_execute(&registry(), &req),
            Err(ExecError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_oversize_input_rejected() {
        let mut req = execute_req("python", "print(input())".to_string());
        req.input = Some("x".repeat(MAX_INPUT_BYTES + 1));
        assert!(matches!(
            validate_execute(&registry(), &req),
            Err(ExecError::Validation(_))
        ));
        req.input = Some("x".repeat(MAX_INPUT_BYTES));
        assert!(validate_execute(&registry(), &req).is_ok());
    }

    #[test]
    fn test_batch_case_count_boundary() {
        let empty = batch_req(vec![]);
        assert!(matches!(
            validate_batch(&registry(), &empty),
            Err(ExecError::Validation(_))
        ));

        let at_limit = batch_req((0..MAX_BATCH_CASES).map(|i| case(&format!("tc_{i}"))).collect());
        assert!(validate_batch(&registry(), &at_limit).is_ok());

        let over_limit =
            batch_req((0..MAX_BATCH_CASES + 1).map(|i| case(&format!("tc_{i}"))).collect());
        assert!(matches!(
            validate_batch(&registry(), &over_limit),
            Err(ExecError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_case_ids_rejected() {
        let req = batch_req(vec![case("tc_0"), case("tc_0")]);
        assert!(matches!(
            validate_batch(&registry(), &req),
            Err(ExecError::Validation(_))
        ));
    }

    #[test]
    fn test_hostile_case_id_rejected() {
        for id in ["", "a b", "x;rm -rf /", "../../etc", "tc$0"] {
            let req = batch_req(vec![case(id)]);
            assert!(
                matches!(validate_batch(&registry(), &req), Err(ExecError::Validation(_))),
                "id {id:?} should be rejected"
            );
        }
        let req = batch_req(vec![case("tc_0-retry")]);
        assert!(validate_batch(&registry(), &req).is_ok());
    }
}
