//! Test verification for lab submissions.
//!
//! A [`TestVerifier`] runs a submission once per test case through an
//! [`Executor`], compares what it produced with the expected output, and
//! folds the per-case verdicts into one [`ExecutionResult`]. Cases run
//! sequentially and independently: each gets a fresh run, so nothing one case
//! does is visible to the next.

pub mod runtime;

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::types::{duration_millis, ErrorKind, ExecutionResult, TestCase, TestCaseResult};
use runtime::Executor;

/// How actual output is compared with expected output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Byte-for-byte comparison
    Exact,
    /// Ignore trailing whitespace and treat CRLF as LF
    #[default]
    TrimEnd,
}

impl MatchPolicy {
    /// Compare actual output with expected output
    #[must_use]
    pub fn matches(self, actual: &str, expected: &str) -> bool {
        match self {
            Self::Exact => actual == expected,
            Self::TrimEnd => normalize(actual) == normalize(expected),
        }
    }
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").trim_end().to_string()
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "trim-end" | "trim_end" | "trim" => Ok(Self::TrimEnd),
            other => Err(format!("unknown match policy: {other}")),
        }
    }
}

/// Outcome of running every test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Logical AND over every case
    pub passed: bool,
    /// One verdict per case, in input order
    pub test_results: Vec<TestCaseResult>,
    /// First run-time failure, if any case hit one
    pub first_error: Option<(ErrorKind, String)>,
    /// Total time spent across all cases
    pub elapsed: Duration,
}

/// Runs submissions against test cases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestVerifier {
    policy: MatchPolicy,
}

impl TestVerifier {
    /// Create a verifier with the given comparison policy
    #[must_use]
    pub const fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    /// The comparison policy in use
    #[must_use]
    pub const fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Run every case and collect per-case verdicts
    #[must_use]
    pub fn verify(&self, executor: &dyn Executor, code: &str, cases: &[TestCase]) -> Verification {
        let mut test_results = Vec::with_capacity(cases.len());
        let mut first_error = None;
        let mut elapsed = Duration::ZERO;

        for (index, case) in cases.iter().enumerate() {
            let result = match executor.run(code, Some(&case.input)) {
                Ok(report) => {
                    elapsed += report.elapsed;
                    let actual_output = report.actual_output();
                    let passed = self.policy.matches(&actual_output, &case.expected_output);
                    TestCaseResult {
                        case: case.clone(),
                        passed,
                        actual_output,
                        error: None,
                    }
                }
                Err(failure) => {
                    elapsed += failure.elapsed;
                    let message = failure.error.to_string();
                    first_error.get_or_insert_with(|| (failure.error.kind(), message.clone()));
                    TestCaseResult {
                        case: case.clone(),
                        passed: false,
                        actual_output: failure.logs.join("\n"),
                        error: Some(message),
                    }
                }
            };
            debug!(
                "{} test {} {}",
                executor.language(),
                index + 1,
                if result.passed { "passed" } else { "failed" }
            );
            test_results.push(result);
        }

        Verification {
            passed: test_results.iter().all(|r| r.passed),
            test_results,
            first_error,
            elapsed,
        }
    }

    /// Run, and when cases are supplied grade, a submission
    ///
    /// `None` just runs the code. An empty case list also just runs it, but
    /// reports an empty `test_results`.
    #[must_use]
    pub fn execute(
        &self,
        executor: &dyn Executor,
        code: &str,
        cases: Option<&[TestCase]>,
    ) -> ExecutionResult {
        match cases {
            Some(cases) if !cases.is_empty() => self.graded(executor, code, cases),
            Some(_) => ExecutionResult {
                test_results: Some(Vec::new()),
                ..run_once(executor, code)
            },
            None => run_once(executor, code),
        }
    }

    fn graded(&self, executor: &dyn Executor, code: &str, cases: &[TestCase]) -> ExecutionResult {
        let verification = self.verify(executor, code, cases);
        let output = summarize(&verification.test_results);
        let (error_kind, error) = verification
            .first_error
            .map_or((None, None), |(kind, message)| (Some(kind), Some(message)));

        ExecutionResult {
            output,
            error,
            error_kind,
            passed: verification.passed,
            execution_time_ms: duration_millis(verification.elapsed),
            test_results: Some(verification.test_results),
        }
    }
}

fn run_once(executor: &dyn Executor, code: &str) -> ExecutionResult {
    match executor.run(code, None) {
        Ok(report) => {
            ExecutionResult::success(executor.render(&report), duration_millis(report.elapsed))
        }
        Err(failure) => ExecutionResult::failure(
            failure.error.kind(),
            failure.error.to_string(),
            executor.render_failure(&failure),
            duration_millis(failure.elapsed),
        ),
    }
}

/// One line per case, then a tally
fn summarize(results: &[TestCaseResult]) -> String {
    let mut out = String::new();
    for (index, result) in results.iter().enumerate() {
        let label = if result.case.description.is_empty() {
            format!("Test {}", index + 1)
        } else {
            format!("Test {} ({})", index + 1, result.case.description)
        };
        let verdict = if result.passed { "PASSED" } else { "FAILED" };
        let _ = writeln!(out, "{label}: {verdict}");

        if !result.passed {
            match &result.error {
                Some(error) => {
                    let _ = writeln!(out, "  error:    {error}");
                }
                None => {
                    let _ = writeln!(out, "  expected: {:?}", result.case.expected_output);
                    let _ = writeln!(out, "  actual:   {:?}", result.actual_output);
                }
            }
        }
    }
    let passed = results.iter().filter(|r| r.passed).count();
    let _ = write!(out, "Passed {passed}/{} test cases", results.len());
    out
}

#[cfg(test)]
mod tests {
    use super::runtime::{RunFailure, RunReport, RuntimeError};
    use super::*;
    use crate::types::Language;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes its input uppercased; inputs starting with `!` fail at run time
    #[derive(Default)]
    struct EchoExecutor {
        runs: AtomicUsize,
    }

    impl Executor for EchoExecutor {
        fn language(&self) -> Language {
            Language::JavaScript
        }

        fn run(&self, _code: &str, input: Option<&str>) -> Result<RunReport, RunFailure> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let Some(input) = input else {
                return Ok(RunReport {
                    elapsed: Duration::from_millis(2),
                    ..RunReport::default()
                });
            };
            if let Some(message) = input.strip_prefix('!') {
                return Err(RunFailure::new(
                    RuntimeError::ExecutionFailed(message.to_string()),
                    vec!["partial".to_string()],
                    Duration::from_millis(1),
                ));
            }
            Ok(RunReport {
                logs: vec![input.to_uppercase()],
                elapsed: Duration::from_millis(2),
                ..RunReport::default()
            })
        }
    }

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase::new(input, expected, "")
    }

    #[test]
    fn test_all_cases_pass() {
        let executor = EchoExecutor::default();
        let cases = vec![case("a", "A"), case("b", "B")];

        let result = TestVerifier::default().execute(&executor, "", Some(&cases));
        assert!(result.passed);
        assert!(result.error.is_none());
        assert_eq!(result.passed_count(), Some(2));
        assert_eq!(result.execution_time_ms, 4);
        assert!(result.output.ends_with("Passed 2/2 test cases"));
        assert_eq!(executor.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mismatch_is_not_an_error() {
        let executor = EchoExecutor::default();
        let cases = vec![TestCase::new("a", "A", "first"), case("b", "x")];

        let result = TestVerifier::default().execute(&executor, "", Some(&cases));
        assert!(!result.passed);
        assert!(result.error.is_none());
        assert!(result.error_kind.is_none());

        let results = result.test_results.as_ref().unwrap();
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert_eq!(results[1].actual_output, "B");
        assert!(result.output.contains("Test 1 (first): PASSED"));
        assert!(result.output.contains("Test 2: FAILED\n  expected: \"x\"\n  actual:   \"B\""));
    }

    #[test]
    fn test_runtime_failure_sets_error() {
        let executor = EchoExecutor::default();
        let cases = vec![case("a", "A"), case("!boom", "X"), case("!later", "Y")];

        let result = TestVerifier::default().execute(&executor, "", Some(&cases));
        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.error_kind, Some(ErrorKind::Runtime));

        let results = result.test_results.unwrap();
        assert_eq!(results[1].actual_output, "partial");
        assert_eq!(results[1].error.as_deref(), Some("boom"));
        assert_eq!(results[2].error.as_deref(), Some("later"));
    }

    #[test]
    fn test_none_just_runs() {
        let executor = EchoExecutor::default();
        let result = TestVerifier::default().execute(&executor, "", None);
        assert!(result.passed);
        assert!(result.test_results.is_none());
        assert_eq!(result.output, "Execution time: 2ms");
    }

    #[test]
    fn test_empty_cases_reflect_runtime_success() {
        let executor = EchoExecutor::default();
        let result = TestVerifier::default().execute(&executor, "", Some(&[]));
        assert!(result.passed);
        assert_eq!(result.test_results, Some(Vec::new()));
        assert_eq!(executor.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trailing_newline_policies() {
        let executor = EchoExecutor::default();
        let expected_has_newline = vec![case("a", "A\n")];

        let exact = TestVerifier::new(MatchPolicy::Exact);
        assert!(!exact.execute(&executor, "", Some(&expected_has_newline)).passed);

        let trimmed = TestVerifier::new(MatchPolicy::TrimEnd);
        assert!(trimmed.execute(&executor, "", Some(&expected_has_newline)).passed);
    }

    #[test]
    fn test_actual_with_trailing_newline() {
        assert!(!MatchPolicy::Exact.matches("A\n", "A"));
        assert!(MatchPolicy::TrimEnd.matches("A\n", "A"));
        assert!(MatchPolicy::TrimEnd.matches("A\r\nB\r\n", "A\nB"));
        assert!(!MatchPolicy::TrimEnd.matches(" A", "A"));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("exact".parse::<MatchPolicy>(), Ok(MatchPolicy::Exact));
        assert_eq!("Trim-End".parse::<MatchPolicy>(), Ok(MatchPolicy::TrimEnd));
        assert!("fuzzy".parse::<MatchPolicy>().is_err());
    }

    proptest! {
        #[test]
        fn prop_results_preserve_order_and_aggregate(
            inputs in proptest::collection::vec("!?[a-z]{0,6}", 0..8),
            flips in proptest::collection::vec(any::<bool>(), 8),
        ) {
            let executor = EchoExecutor::default();
            let cases: Vec<TestCase> = inputs
                .iter()
                .zip(&flips)
                .map(|(input, flip)| {
                    let expected = if *flip { input.to_uppercase() } else { format!("{input}?") };
                    case(input, &expected)
                })
                .collect();

            let verification = TestVerifier::default().verify(&executor, "", &cases);

            prop_assert_eq!(verification.test_results.len(), cases.len());
            for (result, case) in verification.test_results.iter().zip(&cases) {
                prop_assert_eq!(&result.case, case);
            }
            prop_assert_eq!(
                verification.passed,
                verification.test_results.iter().all(|r| r.passed)
            );
        }
    }
}
