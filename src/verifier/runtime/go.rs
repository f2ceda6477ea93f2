//! Go playground simulator.
//!
//! This is not a Go compiler or interpreter. It walks the submission line by
//! line and understands a small teaching subset: `package`, single and grouped
//! `import`, `func main() {`, `fmt.Println`, `var NAME [TYPE] [= VALUE]` and
//! `NAME := VALUE`. Variables share one flat namespace with no scoping or type
//! checking. There is no control flow: every recognized statement inside
//! `main` runs once, in source order, and anything else is ignored.

use super::{time_section, Executor, RunFailure, RunReport, RuntimeError, SandboxConfig};
use crate::types::Language;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::trace;

const OUTPUT_HEADER: &str = "Go simulation output:";
const UNKNOWN_EXPR: &str = "<expr>";

/// A value the simulator can hold in a variable
#[derive(Debug, Clone, PartialEq)]
enum GoValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Unknown,
}

impl GoValue {
    /// Zero value for a declared type
    fn zero(type_name: &str) -> Self {
        match type_name {
            "string" => Self::Str(String::new()),
            "bool" => Self::Bool(false),
            "float32" | "float64" => Self::Float(0.0),
            t if t.starts_with("int") || t.starts_with("uint") || t == "byte" || t == "rune" => {
                Self::Int(0)
            }
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for GoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Unknown => f.write_str(UNKNOWN_EXPR),
        }
    }
}

/// Per-run state, never shared between runs
#[derive(Default)]
struct Simulation {
    notes: Vec<String>,
    output: Vec<String>,
    output_bytes: usize,
    vars: HashMap<String, GoValue>,
    in_main: bool,
    depth: usize,
    in_import_group: bool,
}

impl Simulation {
    fn step(&mut self, line_no: usize, raw: &str, max_output: usize) -> Result<(), RuntimeError> {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            return Ok(());
        }

        if self.in_import_group {
            if line.starts_with(')') {
                self.in_import_group = false;
            } else {
                self.record_import(line);
            }
            return Ok(());
        }

        if let Some(name) = line.strip_prefix("package ") {
            self.notes.push(format!("Using package: {}", name.trim()));
            return Ok(());
        }

        if let Some(spec) = line
            .strip_prefix("import")
            .filter(|rest| rest.is_empty() || rest.starts_with([' ', '\t', '(', '"']))
        {
            let spec = spec.trim();
            if let Some(group) = spec.strip_prefix('(') {
                let group = group.trim();
                match group.strip_suffix(')') {
                    // import ("fmt")
                    Some(single) if !single.trim().is_empty() => self.record_import(single),
                    Some(_) => {}
                    None => self.in_import_group = true,
                }
            } else if !spec.is_empty() {
                self.record_import(spec);
            }
            return Ok(());
        }

        if line.starts_with("func main(") && line.ends_with('{') {
            self.in_main = true;
            self.depth += 1;
            return Ok(());
        }

        if !self.in_main {
            return Ok(());
        }

        if line == "}" {
            self.depth = self.depth.saturating_sub(1);
            if self.depth == 0 {
                self.in_main = false;
            }
            return Ok(());
        }

        // `} else {` and friends close one block and open another
        if line.ends_with('{') {
            if !line.starts_with('}') {
                self.depth += 1;
            }
            return Ok(());
        }

        let statement = line.strip_suffix(';').unwrap_or(line).trim_end();

        if let Some(args) = println_args(statement) {
            let values = split_args(args, line_no)?
                .into_iter()
                .map(|arg| self.evaluate(arg, line_no))
                .collect::<Result<Vec<_>, _>>()?;
            let rendered = values
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            self.output_bytes += rendered.len() + 1;
            if self.output_bytes > max_output {
                return Err(RuntimeError::OutputTooLarge { max: max_output });
            }
            self.output.push(rendered);
        } else if let Some((name, value)) = self.var_declaration(statement, line_no)? {
            self.vars.insert(name, value);
        } else if let Some((name, expr)) = short_declaration(statement) {
            let value = self.evaluate(expr, line_no)?;
            self.vars.insert(name.to_string(), value);
        } else {
            trace!("go simulator ignoring line {}: {}", line_no, statement);
        }

        Ok(())
    }

    /// Take the quoted path when present, else the first token
    fn record_import(&mut self, spec: &str) {
        let spec = spec.trim();
        let name = match (spec.find('"'), spec.rfind('"')) {
            (Some(open), Some(close)) if close > open => &spec[open + 1..close],
            _ => spec.split_whitespace().next().unwrap_or_default(),
        };
        if !name.is_empty() {
            self.notes.push(format!("Imported: {name}"));
        }
    }

    /// `var NAME TYPE = VALUE`, `var NAME = VALUE` or `var NAME TYPE`
    fn var_declaration(
        &self,
        statement: &str,
        line_no: usize,
    ) -> Result<Option<(String, GoValue)>, RuntimeError> {
        let Some(rest) = statement.strip_prefix("var ") else {
            return Ok(None);
        };

        let (left, right) = match rest.split_once('=') {
            Some((left, right)) => (left, Some(right)),
            None => (rest, None),
        };
        let mut tokens = left.split_whitespace();
        let Some(name) = tokens.next().filter(|n| is_identifier(n)) else {
            return Ok(None);
        };
        let type_name = tokens.next();

        let value = match (right, type_name) {
            (Some(expr), _) => self.evaluate(expr, line_no)?,
            (None, Some(type_name)) => GoValue::zero(type_name),
            (None, None) => return Ok(None),
        };
        Ok(Some((name.to_string(), value)))
    }

    /// Evaluate a literal or a previously bound variable
    fn evaluate(&self, expr: &str, line_no: usize) -> Result<GoValue, RuntimeError> {
        let expr = expr.trim();

        if let Some(body) = expr.strip_prefix('"') {
            let Some(body) = body.strip_suffix('"').filter(|_| !ends_with_escape(body)) else {
                return Err(unterminated(line_no));
            };
            return Ok(GoValue::Str(unescape(body)));
        }

        if let Some(body) = expr.strip_prefix('`') {
            return body
                .strip_suffix('`')
                .map(|raw| GoValue::Str(raw.to_string()))
                .ok_or_else(|| unterminated(line_no));
        }

        match expr {
            "true" => return Ok(GoValue::Bool(true)),
            "false" => return Ok(GoValue::Bool(false)),
            _ => {}
        }

        if let Ok(n) = expr.parse::<i64>() {
            return Ok(GoValue::Int(n));
        }

        if looks_numeric(expr) {
            if let Ok(x) = expr.parse::<f64>() {
                return Ok(GoValue::Float(x));
            }
        }

        Ok(self.vars.get(expr).cloned().unwrap_or(GoValue::Unknown))
    }
}

fn unterminated(line_no: usize) -> RuntimeError {
    RuntimeError::ExecutionFailed(format!("line {line_no}: unterminated string literal"))
}

/// Drop a trailing `//` comment that sits outside any string literal
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev = None;

    for (idx, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q == '"' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
        } else if c == '"' || c == '`' {
            quote = Some(c);
        } else if c == '/' && prev == Some('/') {
            return &line[..idx - 1];
        }
        prev = Some(c);
    }
    line
}

fn println_args(statement: &str) -> Option<&str> {
    statement.strip_prefix("fmt.Println(")?.strip_suffix(')')
}

/// `NAME := VALUE` with a single identifier on the left
fn short_declaration(statement: &str) -> Option<(&str, &str)> {
    let (name, expr) = statement.split_once(":=")?;
    let name = name.trim();
    is_identifier(name).then_some((name, expr))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Reject `inf`, `NaN` and friends, which Rust parses but Go does not
fn looks_numeric(expr: &str) -> bool {
    let digits = expr.trim_start_matches(['-', '+']);
    digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && digits.chars().any(|c| c.is_ascii_digit())
}

fn ends_with_escape(body: &str) -> bool {
    // `"abc\"` has an escaped closing quote, so the literal never closed
    let trailing = body
        .strip_suffix('"')
        .unwrap_or(body)
        .chars()
        .rev()
        .take_while(|&c| c == '\\')
        .count();
    trailing % 2 == 1
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split call arguments on top-level commas, respecting string literals
fn split_args(args: &str, line_no: usize) -> Result<Vec<&str>, RuntimeError> {
    if args.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, c) in args.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q == '"' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&args[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if quote.is_some() {
        return Err(unterminated(line_no));
    }
    parts.push(&args[start..]);
    Ok(parts)
}

/// Textual Go simulator for playground output
pub struct GoSimulator {
    config: SandboxConfig,
}

impl GoSimulator {
    /// Create a simulator with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SandboxConfig::default())
    }

    /// Create a simulator with custom configuration
    #[must_use]
    pub const fn with_config(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn simulate(&self, code: &str) -> Result<RunReport, RunFailure> {
        let start = Instant::now();
        let deadline = self.config.timeout();
        let mut sim = Simulation::default();

        for (idx, line) in code.lines().enumerate() {
            if start.elapsed() >= deadline {
                return Err(RunFailure::new(
                    RuntimeError::Timeout(self.config.timeout_ms),
                    sim.output,
                    start.elapsed(),
                ));
            }
            if let Err(error) = sim.step(idx + 1, line, self.config.max_output_bytes) {
                return Err(RunFailure::new(error, sim.output, start.elapsed()));
            }
        }

        Ok(RunReport {
            logs: sim.output,
            notes: sim.notes,
            return_value: None,
            elapsed: start.elapsed(),
        })
    }
}

impl Default for GoSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for GoSimulator {
    fn language(&self) -> Language {
        Language::Go
    }

    fn run(&self, code: &str, _input: Option<&str>) -> Result<RunReport, RunFailure> {
        self.config.check_code_size(code)?;
        self.simulate(code)
    }

    fn render(&self, report: &RunReport) -> String {
        let mut lines = vec![OUTPUT_HEADER.to_string()];
        if report.notes.is_empty() && report.logs.is_empty() {
            lines.push("No output".to_string());
        }
        lines.extend(report.notes.iter().cloned());
        lines.extend(report.logs.iter().cloned());
        format!("{}\n\n{}", lines.join("\n"), time_section(report.elapsed))
    }

    fn render_failure(&self, failure: &RunFailure) -> String {
        if !failure.error.was_executed() {
            return String::new();
        }
        let mut lines = vec![OUTPUT_HEADER.to_string()];
        lines.extend(failure.logs.iter().cloned());
        lines.push(format!("Runtime error: {}", failure.error));
        format!("{}\n\n{}", lines.join("\n"), time_section(failure.elapsed))
    }
}
