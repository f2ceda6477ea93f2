//! Execution results and test case types.

use serde::{Deserialize, Serialize};

/// A single expected input/output pair supplied by a lab definition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Input handed to the submission's entry point
    pub input: String,
    /// Output the submission must produce
    pub expected_output: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
}

impl TestCase {
    /// Create a new test case
    pub fn new(
        input: impl Into<String>,
        expected_output: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            description: description.into(),
        }
    }
}

/// Verdict for one test case, in the same position as its input case
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    /// The case that was run
    #[serde(flatten)]
    pub case: TestCase,
    /// Whether the case ran cleanly and matched
    pub passed: bool,
    /// What the submission actually produced
    pub actual_output: String,
    /// Runtime error raised while running this case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Classification of a failed execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Submission matched a forbidden pattern and was never run
    GuardRejected,
    /// Submission or its output exceeded a configured size limit
    ResourceLimit,
    /// Compile/syntax failure or an exception while running
    Runtime,
    /// Execution hit the wall-clock deadline and was aborted
    TimedOut,
    /// No executor exists for the requested language
    UnsupportedLanguage,
    /// The executor for this language is a placeholder
    NotImplemented,
}

/// Uniform outcome of every execution call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Rendered program output
    pub output: String,
    /// Failure message, set only for failures that are not test mismatches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure classification, present whenever `error` is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Overall verdict
    pub passed: bool,
    /// Wall-clock time spent executing
    pub execution_time_ms: u64,
    /// Per-case verdicts, in input order, when test cases were supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestCaseResult>>,
}

impl ExecutionResult {
    /// Result for a language outside the supported set
    #[must_use]
    pub fn unsupported(language: &str) -> Self {
        Self {
            output: String::new(),
            error: Some(format!("Language {language} not supported")),
            error_kind: Some(ErrorKind::UnsupportedLanguage),
            passed: false,
            execution_time_ms: 0,
            test_results: None,
        }
    }

    /// Result for a failed execution
    #[must_use]
    pub fn failure(
        kind: ErrorKind,
        error: impl Into<String>,
        output: String,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            output,
            error: Some(error.into()),
            error_kind: Some(kind),
            passed: false,
            execution_time_ms,
            test_results: None,
        }
    }

    /// Result for a clean run
    #[must_use]
    pub const fn success(output: String, execution_time_ms: u64) -> Self {
        Self {
            output,
            error: None,
            error_kind: None,
            passed: true,
            execution_time_ms,
            test_results: None,
        }
    }

    /// Number of test cases that passed, if any were run
    #[must_use]
    pub fn passed_count(&self) -> Option<usize> {
        self.test_results
            .as_ref()
            .map(|results| results.iter().filter(|r| r.passed).count())
    }

    /// Text a caller should show: output, else error, else a placeholder
    #[must_use]
    pub fn display_text(&self) -> &str {
        if !self.output.is_empty() {
            &self.output
        } else if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            error
        } else {
            "No output"
        }
    }
}
