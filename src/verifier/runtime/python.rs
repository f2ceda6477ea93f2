//! Python runtime.
//!
//! In demo mode (the default) every run fails with a fixed explanation. In
//! subprocess mode the submission runs in a local interpreter with restricted
//! builtins, fed the test input on stdin and killed at the deadline. The
//! interpreter is located once per runtime and cached in a `OnceLock`.

use super::{
    EnvironmentCheck, Executor, RunFailure, RunReport, RuntimeError, SandboxConfig,
};
use crate::types::Language;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Error reported by every run in demo mode
pub const DEMO_MODE_MESSAGE: &str = "Python execution service not available in demo mode";

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How Python submissions are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PythonMode {
    /// Placeholder that never runs code
    #[default]
    Demo,
    /// Run code in a local interpreter process
    Subprocess,
}

/// Configuration for the Python runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    /// Execution mode
    pub mode: PythonMode,
    /// Interpreter to use; `python3` then `python` on PATH when unset
    pub interpreter: Option<PathBuf>,
    /// Top-level modules submissions may import
    pub allowed_imports: Vec<String>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            mode: PythonMode::Demo,
            interpreter: None,
            allowed_imports: ["math", "string", "itertools", "collections", "functools", "re"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// A located interpreter
#[derive(Debug, Clone)]
struct Interpreter {
    path: PathBuf,
    version: String,
}

/// Python runtime for learner submissions
pub struct PythonRuntime {
    config: SandboxConfig,
    python: PythonConfig,
    interpreter: OnceLock<Option<Interpreter>>,
}

impl PythonRuntime {
    /// Create a demo-mode Python runtime
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SandboxConfig::default(), PythonConfig::default())
    }

    /// Create a Python runtime with custom configuration
    #[must_use]
    pub const fn with_config(config: SandboxConfig, python: PythonConfig) -> Self {
        Self {
            config,
            python,
            interpreter: OnceLock::new(),
        }
    }

    /// Locate the interpreter on first use; later calls reuse the answer
    fn interpreter(&self) -> Option<&Interpreter> {
        self.interpreter
            .get_or_init(|| Self::locate(self.python.interpreter.as_deref()))
            .as_ref()
    }

    fn locate(configured: Option<&Path>) -> Option<Interpreter> {
        let candidates: Vec<PathBuf> = match configured {
            Some(path) => vec![path.to_path_buf()],
            None => vec![PathBuf::from("python3"), PathBuf::from("python")],
        };

        let found = candidates.into_iter().find_map(|path| {
            let output = Command::new(&path).arg("--version").output().ok()?;
            if !output.status.success() {
                return None;
            }
            // Python 2 printed its version on stderr
            let text = if output.stdout.is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            let version = String::from_utf8_lossy(&text).trim().to_string();
            Some(Interpreter { path, version })
        });

        match &found {
            Some(interp) => info!("using {} at {}", interp.version, interp.path.display()),
            None => warn!("no python interpreter found"),
        }
        found
    }

    /// Wrapper script that sets up restricted builtins and runs the submission
    fn wrapper_script(&self, code: &str, input: &str) -> String {
        let code_hex = hex::encode(code.as_bytes());
        let input_hex = hex::encode(input.as_bytes());
        let allowed = self
            .python
            .allowed_imports
            .iter()
            .map(|m| format!("{m:?}"))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r"
import builtins
import io
import sys

# Restricted builtins
SAFE_BUILTINS = {{
    'abs', 'all', 'any', 'ascii', 'bin', 'bool', 'bytearray', 'bytes',
    'callable', 'chr', 'classmethod', 'dict', 'divmod', 'enumerate', 'filter',
    'float', 'format', 'frozenset', 'getattr', 'hasattr', 'hash', 'hex', 'id',
    'input', 'int', 'isinstance', 'issubclass', 'iter', 'len', 'list', 'map',
    'max', 'min', 'next', 'object', 'oct', 'ord', 'pow', 'print', 'property',
    'range', 'repr', 'reversed', 'round', 'set', 'setattr', 'slice', 'sorted',
    'staticmethod', 'str', 'sum', 'super', 'tuple', 'type', 'zip',
    '__build_class__', 'Exception', 'ArithmeticError', 'AssertionError',
    'AttributeError', 'ImportError', 'IndexError', 'KeyError', 'LookupError',
    'NameError', 'NotImplementedError', 'RuntimeError', 'StopIteration',
    'TypeError', 'ValueError', 'ZeroDivisionError', 'True', 'False', 'None'
}}
ALLOWED_IMPORTS = {{{allowed}}}

_real_import = builtins.__import__
def _safe_import(name, globals=None, locals=None, fromlist=(), level=0):
    if name.split('.')[0] in ALLOWED_IMPORTS:
        return _real_import(name, globals, locals, fromlist, level)
    raise ImportError(f'import {{name}} blocked')

restricted = {{k: getattr(builtins, k) for k in SAFE_BUILTINS if hasattr(builtins, k)}}
restricted['__import__'] = _safe_import

sys.stdin = io.StringIO(bytes.fromhex('{input_hex}').decode('utf-8'))
source = bytes.fromhex('{code_hex}').decode('utf-8')
ns = {{'__builtins__': restricted, '__name__': '__main__'}}

try:
    exec(compile(source, '<submission>', 'exec'), ns)
except BaseException as e:
    sys.stdout.flush()
    print(f'{{type(e).__name__}}: {{e}}', file=sys.stderr)
    sys.exit(1)
",
        )
    }

    /// Execute Python code via subprocess
    fn execute_subprocess(&self, code: &str, input: Option<&str>) -> Result<RunReport, RunFailure> {
        let start = Instant::now();
        let interpreter = self.interpreter().ok_or_else(|| {
            RuntimeError::NotAvailable("no Python interpreter found on this host".to_string())
        })?;

        let wrapper = self.wrapper_script(code, input.unwrap_or_default());

        let mut child = Command::new(&interpreter.path)
            .args(["-I", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RuntimeError::Setup(format!(
                    "failed to spawn Python ({}): {e}",
                    interpreter.path.display()
                ))
            })?;

        // Write wrapper script to stdin; dropping the handle closes it
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(wrapper.as_bytes()).map_err(|e| {
                RuntimeError::Setup(format!("failed to write to interpreter stdin: {e}"))
            })?;
        }

        let limit = self.config.max_output_bytes;
        let stdout = drain(child.stdout.take(), limit);
        let stderr = drain(child.stderr.take(), limit);

        let status = self.wait_with_deadline(&mut child, start);
        let (stdout, stdout_overflow) = collect(stdout);
        let (stderr, _) = collect(stderr);
        let elapsed = start.elapsed();
        let logs = split_lines(&stdout);

        let status = match status {
            Ok(status) => status,
            Err(error) => return Err(RunFailure::new(error, logs, elapsed)),
        };

        if stdout_overflow {
            return Err(RunFailure::new(
                RuntimeError::OutputTooLarge { max: limit },
                logs,
                elapsed,
            ));
        }

        if !status.success() {
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .map_or_else(|| format!("Python exited with {status}"), ToString::to_string);
            debug!("python submission failed: {}", message);
            return Err(RunFailure::new(
                RuntimeError::ExecutionFailed(message),
                logs,
                elapsed,
            ));
        }

        Ok(RunReport {
            logs,
            notes: Vec::new(),
            return_value: None,
            elapsed,
        })
    }

    fn wait_with_deadline(&self, child: &mut Child, start: Instant) -> Result<ExitStatus, RuntimeError> {
        let timeout = self.config.timeout();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if start.elapsed() >= timeout => {
                    warn!("python submission timed out after {}ms", self.config.timeout_ms);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(RuntimeError::Timeout(self.config.timeout_ms));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(RuntimeError::Setup(format!("process error: {e}")));
                }
            }
        }
    }
}

impl Default for PythonRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipes a child can hand back
trait Pipe: Read + Send + 'static {}
impl Pipe for ChildStdout {}
impl Pipe for ChildStderr {}

/// Read a pipe to the end on a helper thread, keeping at most `limit` bytes
fn drain<P: Pipe>(pipe: Option<P>, limit: usize) -> JoinHandle<(Vec<u8>, bool)> {
    std::thread::spawn(move || {
        let mut kept = Vec::new();
        let mut overflow = false;
        let Some(mut pipe) = pipe else {
            return (kept, overflow);
        };
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = limit.saturating_sub(kept.len());
                    if n > room {
                        overflow = true;
                    }
                    kept.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
        (kept, overflow)
    })
}

fn collect(handle: JoinHandle<(Vec<u8>, bool)>) -> (String, bool) {
    let (bytes, overflow) = handle.join().unwrap_or_default();
    (String::from_utf8_lossy(&bytes).into_owned(), overflow)
}

fn split_lines(stdout: &str) -> Vec<String> {
    let trimmed = stdout.strip_suffix('\n').unwrap_or(stdout);
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

impl Executor for PythonRuntime {
    fn language(&self) -> Language {
        Language::Python
    }

    fn run(&self, code: &str, input: Option<&str>) -> Result<RunReport, RunFailure> {
        match self.python.mode {
            PythonMode::Demo => {
                Err(RuntimeError::NotAvailable(DEMO_MODE_MESSAGE.to_string()).into())
            }
            PythonMode::Subprocess => {
                self.config.check_code_size(code)?;
                self.execute_subprocess(code, input)
            }
        }
    }

    fn environment(&self) -> EnvironmentCheck {
        match self.python.mode {
            PythonMode::Demo => EnvironmentCheck {
                language: Language::Python,
                available: false,
                mode: "demo".to_string(),
                version: None,
                notes: vec![
                    "Set python.mode to \"subprocess\" or LABRUN_PYTHON to run Python locally"
                        .to_string(),
                ],
            },
            PythonMode::Subprocess => {
                let interpreter = self.interpreter();
                EnvironmentCheck {
                    language: Language::Python,
                    available: interpreter.is_some(),
                    mode: "subprocess".to_string(),
                    version: interpreter.map(|i| i.version.clone()),
                    notes: interpreter.map_or_else(
                        || vec!["Install Python 3 or set python.interpreter".to_string()],
                        |i| vec![format!("Interpreter: {}", i.path.display())],
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    fn subprocess_runtime() -> Option<PythonRuntime> {
        let runtime = PythonRuntime::with_config(
            SandboxConfig {
                timeout_ms: 2000,
                ..SandboxConfig::default()
            },
            PythonConfig {
                mode: PythonMode::Subprocess,
                ..PythonConfig::default()
            },
        );
        if runtime.interpreter().is_none() {
            eprintln!("Skipping test: Python not available");
            return None;
        }
        Some(runtime)
    }

    #[test]
    fn test_demo_mode_always_fails() {
        let runtime = PythonRuntime::new();
        for code in ["print('hi')", "", "def broken(:"] {
            let result = runtime.execute(code, None);
            assert!(!result.passed);
            assert!(result.output.is_empty());
            assert_eq!(result.error.as_deref(), Some(DEMO_MODE_MESSAGE));
            assert_eq!(result.error_kind, Some(ErrorKind::NotImplemented));
        }
    }

    #[test]
    fn test_demo_mode_environment() {
        let check = PythonRuntime::new().environment();
        assert!(!check.available);
        assert_eq!(check.mode, "demo");
    }

    #[test]
    fn test_wrapper_embeds_hex_payloads() {
        let runtime = PythonRuntime::new();
        let script = runtime.wrapper_script("print('a')", "xy");
        assert!(script.contains(&hex::encode("print('a')")));
        assert!(script.contains(&hex::encode("xy")));
        assert!(script.contains("ALLOWED_IMPORTS = {\"math\", "));
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines("a\r\nb\n"), vec!["a", "b"]);
        assert!(split_lines("").is_empty());
        assert_eq!(split_lines("\n"), Vec::<String>::new());
    }

    #[test]
    fn test_subprocess_reads_input() {
        let Some(runtime) = subprocess_runtime() else {
            return;
        };
        let report = runtime
            .run("n = int(input())\nprint(n * 2)", Some("21\n"))
            .unwrap();
        assert_eq!(report.actual_output(), "42");
    }

    #[test]
    fn test_subprocess_blocks_dangerous_import() {
        let Some(runtime) = subprocess_runtime() else {
            return;
        };
        let failure = runtime.run("import os\nos.system('ls')", None).unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::Runtime);
        assert!(failure.error.to_string().contains("ImportError"));
    }

    #[test]
    fn test_subprocess_allows_math() {
        let Some(runtime) = subprocess_runtime() else {
            return;
        };
        let report = runtime.run("import math\nprint(math.sqrt(16))", None).unwrap();
        assert_eq!(report.logs, vec!["4.0"]);
    }

    #[test]
    fn test_subprocess_timeout() {
        let Some(runtime) = subprocess_runtime() else {
            return;
        };
        let failure = runtime.run("while True:\n    pass", None).unwrap_err();
        assert_eq!(failure.error, RuntimeError::Timeout(2000));
    }

    #[test]
    fn test_interpreter_probe_runs_once() {
        let runtime = PythonRuntime::with_config(
            SandboxConfig::default(),
            PythonConfig {
                mode: PythonMode::Subprocess,
                interpreter: Some(PathBuf::from("/nonexistent/python")),
                ..PythonConfig::default()
            },
        );
        assert!(runtime.interpreter().is_none());
        assert!(runtime.interpreter.get().is_some());

        let failure = runtime.run("print(1)", None).unwrap_err();
        assert_eq!(failure.error.kind(), ErrorKind::NotImplemented);
    }
}
