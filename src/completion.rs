//! Completion records for verified submissions.
//!
//! The engine never persists anything itself. When a graded run passes every
//! case the caller can build a [`CompletionRecord`] and store it wherever it
//! keeps lab progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{ExecutionResult, Language};

/// Proof that a subject completed a lab
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    /// Who completed the lab (user id, email, ...)
    pub subject: String,
    /// Lab identifier
    pub lab_id: String,
    /// Language the submission was written in
    pub language: Language,
    /// Submitted source
    pub code: String,
    /// Hex SHA-256 of `code`
    pub code_sha256: String,
    /// When verification finished
    pub completed_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// Build a record from a graded result
    ///
    /// Returns `None` unless the result passed and at least one test case
    /// was run. A plain run without cases proves nothing.
    #[must_use]
    pub fn from_result(
        subject: impl Into<String>,
        lab_id: impl Into<String>,
        language: Language,
        code: &str,
        result: &ExecutionResult,
    ) -> Option<Self> {
        let graded = result
            .test_results
            .as_ref()
            .is_some_and(|cases| !cases.is_empty());
        if !result.passed || !graded {
            return None;
        }

        Some(Self {
            subject: subject.into(),
            lab_id: lab_id.into(),
            language,
            code: code.to_string(),
            code_sha256: fingerprint(code),
            completed_at: Utc::now(),
        })
    }

    /// Whether `code` is the submission this record was issued for
    #[must_use]
    pub fn matches_code(&self, code: &str) -> bool {
        self.code_sha256 == fingerprint(code)
    }
}

fn fingerprint(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TestCase, TestCaseResult};

    fn graded(passed: &[bool]) -> ExecutionResult {
        let test_results: Vec<_> = passed
            .iter()
            .map(|&passed| TestCaseResult {
                case: TestCase::new("1", "1", ""),
                passed,
                actual_output: "1".to_string(),
                error: None,
            })
            .collect();
        ExecutionResult {
            passed: passed.iter().all(|p| *p),
            test_results: Some(test_results),
            ..ExecutionResult::success(String::new(), 3)
        }
    }

    #[test]
    fn test_record_for_passing_result() {
        let code = "function solution(x) { return x; }";
        let record =
            CompletionRecord::from_result("ada", "lab-1", Language::JavaScript, code, &graded(&[true, true]))
                .unwrap();

        assert_eq!(record.lab_id, "lab-1");
        assert_eq!(record.code_sha256.len(), 64);
        assert!(record.matches_code(code));
        assert!(!record.matches_code("function solution(x) { return 1; }"));
    }

    #[test]
    fn test_no_record_for_failure() {
        let result = graded(&[true, false]);
        assert!(CompletionRecord::from_result("ada", "lab-1", Language::Go, "", &result).is_none());
    }

    #[test]
    fn test_no_record_without_cases() {
        let plain = ExecutionResult::success("hi".to_string(), 1);
        assert!(CompletionRecord::from_result("ada", "lab-1", Language::Go, "", &plain).is_none());

        let empty = graded(&[]);
        assert!(empty.passed);
        assert!(CompletionRecord::from_result("ada", "lab-1", Language::Go, "", &empty).is_none());
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let record =
            CompletionRecord::from_result("ada", "lab-2", Language::Python, "print(1)", &graded(&[true]))
                .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["labId"], "lab-2");
        assert_eq!(json["language"], "python");
        assert!(json["completedAt"].is_string());
    }
}
