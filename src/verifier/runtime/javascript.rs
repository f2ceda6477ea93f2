//! JavaScript runtime using an embedded V8 isolate.
//!
//! Submissions run in a bare `deno_core` isolate with no ops registered, so
//! there is no filesystem, network or module loader for user code to reach.
//! The only capability handed in is a console that records lines. A watchdog
//! thread terminates the isolate when the configured timeout elapses.

use super::{Executor, PatternGuard, RunFailure, RunReport, RuntimeError, SandboxConfig};
use crate::types::Language;
use deno_core::{v8, JsRuntime, RuntimeOptions};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const SETUP_SCRIPT: &str = r#"
// Disable dangerous globals
delete globalThis.Deno;
"#;

/// Harness the submission is spliced into.
///
/// User code becomes the body of a function whose `console` parameter is the
/// recording console. The entry point lookup happens in the same scope, so
/// `function main` and `const main = ...` declarations are both visible.
/// The outcome is kept in a closure and read back through the frozen
/// `__labrunSnapshot` global once microtasks have run, so a Promise returned
/// by an async entry point is settled before grading.
const HARNESS: &str = r#"
(() => {
  const __labrunStringify = JSON.stringify;
  const __labrunLimit = __LABRUN_LIMIT__;
  const __labrunState = { logs: [], value: null, error: null, truncated: false, settled: false };
  let __labrunBytes = 0;

  const __labrunUtf8Length = (text) => {
    let n = 0;
    for (let i = 0; i < text.length; i++) {
      const c = text.charCodeAt(i);
      if (c < 0x80) n += 1;
      else if (c < 0x800) n += 2;
      else if (c >= 0xd800 && c <= 0xdbff && i + 1 < text.length
        && (text.charCodeAt(i + 1) & 0xfc00) === 0xdc00) { n += 4; i++; }
      else n += 3;
    }
    return n;
  };

  const __labrunFormat = (value) => {
    if (typeof value === "string") return value;
    if (value instanceof Error) return value.name + ": " + value.message;
    if (typeof value === "function") return "[Function: " + (value.name || "anonymous") + "]";
    if (value !== null && typeof value === "object") {
      try {
        return __labrunStringify(value, null, 2);
      } catch (_) {
        return String(value);
      }
    }
    return String(value);
  };

  const __labrunRecord = (prefix, args) => {
    if (__labrunState.truncated) return;
    const line = prefix + args.map(__labrunFormat).join(" ");
    __labrunBytes += __labrunUtf8Length(line) + 1;
    if (__labrunBytes > __labrunLimit) {
      __labrunState.truncated = true;
      return;
    }
    __labrunState.logs.push(line);
  };

  const __labrunConsole = Object.freeze({
    log: (...args) => __labrunRecord("", args),
    info: (...args) => __labrunRecord("", args),
    warn: (...args) => __labrunRecord("Warning: ", args),
    error: (...args) => __labrunRecord("Error: ", args),
  });

  const __labrunEncode = (value) => {
    if (value === undefined) return null;
    try {
      const json = __labrunStringify(value);
      return json === undefined ? null : json;
    } catch (_) {
      return __labrunStringify(String(value));
    }
  };

  const __labrunDescribe = (e) =>
    e instanceof Error ? e.name + ": " + e.message : "Uncaught " + String(e);

  const __labrunSettle = (value, error) => {
    if (__labrunState.settled) return;
    __labrunState.value = value;
    __labrunState.error = error;
    __labrunState.settled = true;
  };

  Object.defineProperty(globalThis, "__labrunSnapshot", {
    value: () => __labrunStringify(__labrunState),
    writable: false,
    configurable: false,
  });

  let __labrunResult;
  try {
    __labrunResult = (function (console, __labrunInput) {
__LABRUN_CODE__
;
      if (typeof main === "function") return main(__labrunInput);
      if (typeof solution === "function") return solution(__labrunInput);
      return undefined;
    })(__labrunConsole, __LABRUN_INPUT__);
  } catch (e) {
    __labrunSettle(null, __labrunDescribe(e));
    return;
  }

  try {
    const thenable = __labrunResult !== null
      && (typeof __labrunResult === "object" || typeof __labrunResult === "function")
      && typeof __labrunResult.then === "function";
    if (thenable) {
      __labrunResult.then(
        (value) => __labrunSettle(__labrunEncode(value), null),
        (e) => __labrunSettle(null, __labrunDescribe(e)),
      );
    } else {
      __labrunSettle(__labrunEncode(__labrunResult), null);
    }
  } catch (e) {
    __labrunSettle(null, __labrunDescribe(e));
  }
})();
"#;

/// Reads the harness state; `null` when the harness never ran
const SNAPSHOT_SCRIPT: &str =
    r#"typeof globalThis.__labrunSnapshot === "function" ? globalThis.__labrunSnapshot() : "null""#;

/// Error for an async entry point whose Promise is still pending
const UNSETTLED_MESSAGE: &str = "entry point returned a Promise that never settled";

/// Result envelope produced by the harness
#[derive(Debug, Deserialize)]
struct Envelope {
    logs: Vec<String>,
    value: Option<String>,
    error: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    settled: bool,
}

/// JavaScript runtime for learner submissions
pub struct JavaScriptRuntime {
    config: SandboxConfig,
    guard: PatternGuard,
}

impl JavaScriptRuntime {
    /// Create a new JavaScript runtime with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SandboxConfig::default())
    }

    /// Create a new JavaScript runtime with custom configuration
    #[must_use]
    pub fn with_config(config: SandboxConfig) -> Self {
        let guard = PatternGuard::new().with_extra_patterns(config.extra_blocked_patterns.clone());
        Self { config, guard }
    }

    /// The guard applied before evaluation
    #[must_use]
    pub const fn guard(&self) -> &PatternGuard {
        &self.guard
    }

    /// Splice the submission and its input into the harness
    fn build_program(&self, code: &str, input: Option<&str>) -> Result<String, RuntimeError> {
        let input_literal = match input {
            Some(input) => serde_json::to_string(input)
                .map_err(|e| RuntimeError::Setup(format!("cannot encode input: {e}")))?,
            None => "undefined".to_string(),
        };

        // Submission and input are never rescanned for placeholders
        let (head, tail) = HARNESS
            .split_once("__LABRUN_CODE__")
            .ok_or_else(|| RuntimeError::Setup("harness has no code slot".to_string()))?;
        let head = head.replace("__LABRUN_LIMIT__", &self.config.max_output_bytes.to_string());
        let tail = tail.replace("__LABRUN_INPUT__", &input_literal);
        Ok(format!("{head}{code}{tail}"))
    }

    /// Execute JavaScript code in sandboxed environment
    fn execute_sandboxed(&self, code: &str, input: Option<&str>) -> Result<RunReport, RunFailure> {
        let start = Instant::now();
        let program = self
            .build_program(code, input)
            .map_err(|e| RunFailure::new(e, Vec::new(), start.elapsed()))?;

        // Create a sandboxed runtime with no extensions
        let mut runtime = JsRuntime::new(RuntimeOptions::default());

        runtime
            .execute_script("<setup>", SETUP_SCRIPT.to_string().into())
            .map_err(|e| {
                RunFailure::new(RuntimeError::Setup(e.to_string()), Vec::new(), start.elapsed())
            })?;

        // CPU watchdog: terminates V8 if the deadline passes first
        let watchdog_handle = runtime.v8_isolate().thread_safe_handle();
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog_timed_out = Arc::clone(&timed_out);
        let timeout = self.config.timeout();
        let (cancel_tx, cancel_rx) = std::sync::mpsc::channel::<()>();

        let watchdog = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
                watchdog_timed_out.store(true, Ordering::SeqCst);
                watchdog_handle.terminate_execution();
            }
        });

        let outcome = runtime.execute_script("<submission>", program.into());
        if outcome.is_ok() {
            // Settles promises returned by async entry points
            let scope = &mut runtime.handle_scope();
            scope.perform_microtask_checkpoint();
        }

        // The watchdog must be gone before the isolate is dropped
        let _ = cancel_tx.send(());
        let _ = watchdog.join();
        let elapsed = start.elapsed();

        let timed_out = timed_out.load(Ordering::SeqCst);
        if timed_out {
            // Termination may land after the run already finished
            runtime.v8_isolate().cancel_terminate_execution();
        }
        let timeout_failure = |logs: Vec<String>| {
            warn!("javascript submission timed out after {}ms", self.config.timeout_ms);
            RunFailure::new(RuntimeError::Timeout(self.config.timeout_ms), logs, elapsed)
        };

        // Syntax errors surface here, before the harness can catch anything
        if let Err(e) = outcome {
            if timed_out {
                let logs = read_snapshot(&mut runtime)
                    .ok()
                    .flatten()
                    .map(|envelope| envelope.logs)
                    .unwrap_or_default();
                return Err(timeout_failure(logs));
            }
            return Err(RunFailure::new(
                RuntimeError::ExecutionFailed(clean_error_message(&e.to_string())),
                Vec::new(),
                elapsed,
            ));
        }

        let envelope = match read_snapshot(&mut runtime) {
            Ok(Some(envelope)) if envelope.settled => envelope,
            Ok(Some(envelope)) if timed_out => return Err(timeout_failure(envelope.logs)),
            Ok(Some(envelope)) => {
                return Err(RunFailure::new(
                    RuntimeError::ExecutionFailed(UNSETTLED_MESSAGE.to_string()),
                    envelope.logs,
                    elapsed,
                ))
            }
            Ok(None) | Err(_) if timed_out => return Err(timeout_failure(Vec::new())),
            Ok(None) => {
                return Err(RunFailure::new(
                    RuntimeError::Setup("harness produced no result".to_string()),
                    Vec::new(),
                    elapsed,
                ))
            }
            Err(error) => return Err(RunFailure::new(error, Vec::new(), elapsed)),
        };

        if envelope.truncated {
            return Err(RunFailure::new(
                RuntimeError::OutputTooLarge {
                    max: self.config.max_output_bytes,
                },
                envelope.logs,
                elapsed,
            ));
        }

        if let Some(error) = envelope.error {
            debug!("javascript submission threw: {}", error);
            return Err(RunFailure::new(
                RuntimeError::ExecutionFailed(error),
                envelope.logs,
                elapsed,
            ));
        }

        let return_value = envelope
            .value
            .map(|json| serde_json::from_str::<serde_json::Value>(&json))
            .transpose()
            .map_err(|e| {
                RunFailure::new(
                    RuntimeError::Setup(format!("malformed return value: {e}")),
                    envelope.logs.clone(),
                    elapsed,
                )
            })?;

        Ok(RunReport {
            logs: envelope.logs,
            notes: Vec::new(),
            return_value,
            elapsed,
        })
    }
}

impl Default for JavaScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the harness state left in the isolate
fn read_snapshot(runtime: &mut JsRuntime) -> Result<Option<Envelope>, RuntimeError> {
    let global = runtime
        .execute_script("<snapshot>", SNAPSHOT_SCRIPT.to_string().into())
        .map_err(|e| RuntimeError::Setup(format!("cannot read harness result: {e}")))?;
    let raw = {
        let scope = &mut runtime.handle_scope();
        let local = v8::Local::new(scope, &global);
        local.to_rust_string_lossy(scope)
    };
    serde_json::from_str(&raw)
        .map_err(|e| RuntimeError::Setup(format!("malformed harness result: {e}")))
}

/// Keep the first line of a V8 error and drop the `Uncaught` prefix
fn clean_error_message(message: &str) -> String {
    let first = message.lines().next().unwrap_or_default().trim();
    first.strip_prefix("Uncaught ").unwrap_or(first).to_string()
}

impl Executor for JavaScriptRuntime {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn run(&self, code: &str, input: Option<&str>) -> Result<RunReport, RunFailure> {
        let verdict = self.guard.check(code);
        if let Some(pattern) = verdict.violated_pattern {
            warn!("rejected javascript submission: matched {:?}", pattern);
            return Err(RuntimeError::UnsafeOperation { pattern }.into());
        }
        self.config.check_code_size(code)?;
        self.execute_sandboxed(code, input)
    }
}
