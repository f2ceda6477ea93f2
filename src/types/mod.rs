//! Core data types shared by every executor, the dispatcher and the verifier.

mod execution;
mod language;

pub use execution::{ErrorKind, ExecutionResult, TestCase, TestCaseResult};
pub use language::{Language, UnsupportedLanguage};

/// Convert a duration to whole milliseconds, saturating on overflow
#[must_use]
pub fn duration_millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
