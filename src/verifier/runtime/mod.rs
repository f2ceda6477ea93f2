//! Multi-language execution runtime support.
//!
//! Every supported language gets one executor implementing [`Executor`]. An
//! executor runs a submission once and reports what it printed and returned;
//! grading against test cases is layered on top by
//! [`TestVerifier`](crate::verifier::TestVerifier).

pub mod capabilities;
mod go;
mod guard;
mod javascript;
mod python;

pub use capabilities::EnvironmentCheck;
pub use go::GoSimulator;
pub use guard::{GuardVerdict, PatternGuard};
pub use javascript::JavaScriptRuntime;
pub use python::{PythonConfig, PythonMode, PythonRuntime, DEMO_MODE_MESSAGE};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::{duration_millis, ErrorKind, ExecutionResult, Language, TestCase};

/// Runtime execution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Submission matched a denylisted pattern
    #[error("Unsafe operation detected")]
    UnsafeOperation {
        /// The pattern that matched
        pattern: String,
    },

    /// Submission exceeds the configured maximum size
    #[error("code exceeds maximum size of {max} bytes (got {actual})")]
    CodeTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Actual size
        actual: usize,
    },

    /// Printed output exceeds the configured maximum size
    #[error("output exceeds maximum size of {max} bytes")]
    OutputTooLarge {
        /// Maximum allowed size
        max: usize,
    },

    /// Timeout exceeded during execution
    #[error("execution timed out after {0}ms")]
    Timeout(u64),

    /// Compilation or execution failed with an error
    #[error("{0}")]
    ExecutionFailed(String),

    /// The language runtime is a placeholder or not installed
    #[error("{0}")]
    NotAvailable(String),

    /// The runtime itself could not be prepared
    #[error("runtime setup failed: {0}")]
    Setup(String),
}

impl RuntimeError {
    /// Classification used in [`ExecutionResult::error_kind`]
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsafeOperation { .. } => ErrorKind::GuardRejected,
            Self::CodeTooLarge { .. } | Self::OutputTooLarge { .. } => ErrorKind::ResourceLimit,
            Self::Timeout(_) => ErrorKind::TimedOut,
            Self::ExecutionFailed(_) | Self::Setup(_) => ErrorKind::Runtime,
            Self::NotAvailable(_) => ErrorKind::NotImplemented,
        }
    }

    /// Whether any submitted code actually ran before the failure
    #[must_use]
    pub const fn was_executed(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed(_) | Self::Timeout(_) | Self::OutputTooLarge { .. }
        )
    }
}

/// Configuration for runtime sandboxing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum execution time in milliseconds
    pub timeout_ms: u64,
    /// Maximum submission size in bytes
    pub max_code_bytes: usize,
    /// Maximum captured output in bytes
    pub max_output_bytes: usize,
    /// Patterns rejected in addition to the built-in denylist
    pub extra_blocked_patterns: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,             // 5 seconds
            max_code_bytes: 64 * 1024,    // 64 KB
            max_output_bytes: 1024 * 1024, // 1 MB
            extra_blocked_patterns: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Execution deadline as a duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject submissions over the size limit
    ///
    /// # Errors
    /// Returns [`RuntimeError::CodeTooLarge`] when `code` exceeds the limit
    pub const fn check_code_size(&self, code: &str) -> Result<(), RuntimeError> {
        if code.len() > self.max_code_bytes {
            return Err(RuntimeError::CodeTooLarge {
                max: self.max_code_bytes,
                actual: code.len(),
            });
        }
        Ok(())
    }
}

/// What a successful run printed and returned
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    /// Lines written by the program, in order
    pub logs: Vec<String>,
    /// Descriptive lines produced by the runtime rather than the program
    pub notes: Vec<String>,
    /// Value returned by the entry point, if it returned one
    pub return_value: Option<serde_json::Value>,
    /// Wall-clock time of the whole evaluation
    pub elapsed: Duration,
}

impl RunReport {
    /// The text graded against a test case's expected output
    ///
    /// A returned value wins over printed output. Strings are used as-is,
    /// everything else is JSON encoded.
    #[must_use]
    pub fn actual_output(&self) -> String {
        match &self.return_value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => self.logs.join("\n"),
        }
    }

    /// Console output, return value and timing as blank-line separated sections
    #[must_use]
    pub fn render_sections(&self) -> String {
        let mut sections = Vec::with_capacity(3);
        if !self.logs.is_empty() {
            sections.push(self.logs.join("\n"));
        }
        if let Some(value) = &self.return_value {
            sections.push(format!("Return value: {value}"));
        }
        sections.push(time_section(self.elapsed));
        sections.join("\n\n")
    }
}

/// A run that did not complete cleanly
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunFailure {
    /// What went wrong
    pub error: RuntimeError,
    /// Lines printed before the failure
    pub logs: Vec<String>,
    /// Time spent before the failure
    pub elapsed: Duration,
}

impl RunFailure {
    /// Create a failure carrying partial output
    #[must_use]
    pub const fn new(error: RuntimeError, logs: Vec<String>, elapsed: Duration) -> Self {
        Self {
            error,
            logs,
            elapsed,
        }
    }
}

impl From<RuntimeError> for RunFailure {
    fn from(error: RuntimeError) -> Self {
        Self::new(error, Vec::new(), Duration::ZERO)
    }
}

/// Render the timing line shared by every executor
#[must_use]
pub fn time_section(elapsed: Duration) -> String {
    format!("Execution time: {}ms", duration_millis(elapsed))
}

/// Trait for per-language executors
pub trait Executor: Send + Sync {
    /// Get the language this executor runs
    fn language(&self) -> Language;

    /// Run a submission once, handing `input` to its entry point
    ///
    /// # Errors
    /// Returns the failure together with any output printed before it
    fn run(&self, code: &str, input: Option<&str>) -> Result<RunReport, RunFailure>;

    /// Render a successful run for display
    fn render(&self, report: &RunReport) -> String {
        report.render_sections()
    }

    /// Render a failed run for display
    ///
    /// Code that never ran renders as empty output.
    fn render_failure(&self, failure: &RunFailure) -> String {
        if !failure.error.was_executed() {
            return String::new();
        }
        let mut lines = failure.logs.clone();
        lines.push(format!("Runtime error: {}", failure.error));
        [lines.join("\n"), time_section(failure.elapsed)].join("\n\n")
    }

    /// Describe whether this runtime can execute code on this host
    fn environment(&self) -> EnvironmentCheck {
        EnvironmentCheck::embedded(self.language())
    }

    /// Run and, when test cases are supplied, grade a submission
    fn execute(&self, code: &str, test_cases: Option<&[TestCase]>) -> ExecutionResult
    where
        Self: Sized,
    {
        crate::verifier::TestVerifier::default().execute(self, code, test_cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_actual_output_prefers_return_value() {
        let report = RunReport {
            logs: vec!["ignored".to_string()],
            return_value: Some(json!("hello")),
            ..RunReport::default()
        };
        assert_eq!(report.actual_output(), "hello");

        let report = RunReport {
            return_value: Some(json!([1, 2])),
            ..RunReport::default()
        };
        assert_eq!(report.actual_output(), "[1,2]");
    }

    #[test]
    fn test_actual_output_falls_back_to_logs() {
        let report = RunReport {
            logs: vec!["a".to_string(), "b".to_string()],
            ..RunReport::default()
        };
        assert_eq!(report.actual_output(), "a\nb");
    }

    #[test]
    fn test_render_sections_omits_empty() {
        let report = RunReport {
            elapsed: Duration::from_millis(3),
            ..RunReport::default()
        };
        assert_eq!(report.render_sections(), "Execution time: 3ms");

        let report = RunReport {
            logs: vec!["hi".to_string()],
            return_value: Some(json!(42)),
            elapsed: Duration::from_millis(3),
            ..RunReport::default()
        };
        assert_eq!(
            report.render_sections(),
            "hi\n\nReturn value: 42\n\nExecution time: 3ms"
        );
    }

    #[test]
    fn test_error_kinds() {
        let guard = RuntimeError::UnsafeOperation {
            pattern: "fetch(".to_string(),
        };
        assert_eq!(guard.to_string(), "Unsafe operation detected");
        assert_eq!(guard.kind(), ErrorKind::GuardRejected);
        assert!(!guard.was_executed());

        assert_eq!(RuntimeError::Timeout(10).kind(), ErrorKind::TimedOut);
        assert!(RuntimeError::Timeout(10).was_executed());
        assert_eq!(
            RuntimeError::NotAvailable(String::new()).kind(),
            ErrorKind::NotImplemented
        );
    }

    #[test]
    fn test_code_size_limit() {
        let config = SandboxConfig {
            max_code_bytes: 4,
            ..SandboxConfig::default()
        };
        assert!(config.check_code_size("abcd").is_ok());
        assert_eq!(
            config.check_code_size("abcde"),
            Err(RuntimeError::CodeTooLarge { max: 4, actual: 5 })
        );
    }
}
