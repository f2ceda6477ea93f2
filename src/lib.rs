//! # Labrun
//!
//! Per-language code execution and test verification for coding labs.
//!
//! ## Architecture
//!
//! A submission flows through four pieces:
//! - **Dispatcher**: maps a case-insensitive language name to an executor
//! - **Executor**: runs the code once (V8 for JavaScript, a line simulator
//!   for Go, a demo stub or restricted subprocess for Python)
//! - **Pattern Guard**: lexical denylist applied before any JavaScript runs
//! - **Test Verifier**: runs each test case and aggregates the verdicts
//!
//! Every failure is folded into an [`ExecutionResult`]; nothing is thrown
//! across the engine boundary.

#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms
)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod types;
pub mod verifier;

pub use completion::CompletionRecord;
pub use config::{ConfigError, EngineConfig};
pub use dispatcher::Dispatcher;
pub use types::{ErrorKind, ExecutionResult, Language, TestCase, TestCaseResult};
pub use verifier::runtime::{EnvironmentCheck, Executor, RuntimeError, SandboxConfig};
pub use verifier::{MatchPolicy, TestVerifier};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run `code` with the default configuration
///
/// Builds a fresh [`Dispatcher`] per call; long-lived callers should keep
/// one around instead.
pub async fn execute_code(
    code: impl Into<String>,
    language: impl Into<String>,
    test_cases: Option<Vec<TestCase>>,
) -> ExecutionResult {
    Dispatcher::default()
        .execute_code(code.into(), language.into(), test_cases)
        .await
}
