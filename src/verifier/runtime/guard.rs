//! Lexical denylist applied to JavaScript submissions before evaluation.
//!
//! This is a heuristic, not an isolation boundary: string concatenation or
//! computed member access gets past it. The V8 isolate has no host ops
//! registered, and that is what actually contains a submission. The guard
//! exists to reject obvious capability grabs early with a clear message.

/// How a pattern is matched against source text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    /// Substring anywhere in the source
    Anywhere,
    /// Substring not preceded by an identifier character or `.`
    Standalone,
    /// Substring not preceded by an identifier character; member access
    /// such as `globalThis.Function(` still matches
    Identifier,
}

/// Patterns that are banned from submissions.
const BANNED_PATTERNS: &[(&str, Match)] = &[
    // Module loading
    ("require(", Match::Anywhere),
    ("import(", Match::Anywhere),
    // Network
    ("fetch(", Match::Anywhere),
    ("XMLHttpRequest", Match::Anywhere),
    ("WebSocket", Match::Anywhere),
    // Browser storage, DOM and window
    ("localStorage", Match::Anywhere),
    ("sessionStorage", Match::Anywhere),
    ("indexedDB", Match::Anywhere),
    ("document.", Match::Anywhere),
    ("window.", Match::Anywhere),
    ("globalThis[", Match::Anywhere),
    // Process and host
    ("process.", Match::Anywhere),
    ("Deno.", Match::Anywhere),
    // Filesystem
    ("fs.", Match::Standalone),
    ("readFileSync", Match::Anywhere),
    ("writeFileSync", Match::Anywhere),
    // Subprocesses
    ("child_process", Match::Anywhere),
    ("spawn(", Match::Standalone),
    ("exec(", Match::Standalone),
    // Code construction
    ("eval(", Match::Identifier),
    ("Function(", Match::Identifier),
];

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardVerdict {
    /// Whether the source may be evaluated
    pub allowed: bool,
    /// First pattern that matched, when rejected
    pub violated_pattern: Option<String>,
}

impl GuardVerdict {
    const fn allow() -> Self {
        Self {
            allowed: true,
            violated_pattern: None,
        }
    }

    fn deny(pattern: &str) -> Self {
        Self {
            allowed: false,
            violated_pattern: Some(pattern.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pattern {
    text: String,
    matching: Match,
}

impl Pattern {
    fn found_in(&self, source: &str) -> bool {
        match self.matching {
            Match::Anywhere => source.contains(self.text.as_str()),
            Match::Standalone => self.preceded_by(source, |c| !(is_ident_char(c) || c == '.')),
            Match::Identifier => self.preceded_by(source, |c| !is_ident_char(c)),
        }
    }

    /// Whether some occurrence starts the source or follows a char accepted by `boundary`
    fn preceded_by(&self, source: &str, boundary: impl Fn(char) -> bool) -> bool {
        source
            .match_indices(self.text.as_str())
            .any(|(idx, _)| source[..idx].chars().next_back().map_or(true, &boundary))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$')
}

/// Static denylist check over submitted source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternGuard {
    patterns: Vec<Pattern>,
}

impl Default for PatternGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternGuard {
    /// Create a guard with the built-in denylist
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: BANNED_PATTERNS
                .iter()
                .map(|(text, matching)| Pattern {
                    text: (*text).to_string(),
                    matching: *matching,
                })
                .collect(),
        }
    }

    /// Extend the denylist with substring patterns
    #[must_use]
    pub fn with_extra_patterns<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(
            extra
                .into_iter()
                .map(Into::into)
                .filter(|text: &String| !text.is_empty())
                .map(|text| Pattern {
                    text,
                    matching: Match::Anywhere,
                }),
        );
        self
    }

    /// Iterate over the active patterns
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.text.as_str())
    }

    /// Check source text against the denylist
    #[must_use]
    pub fn check(&self, source: &str) -> GuardVerdict {
        self.patterns
            .iter()
            .find(|pattern| pattern.found_in(source))
            .map_or_else(GuardVerdict::allow, |pattern| GuardVerdict::deny(&pattern.text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_by(code: &str) -> Option<String> {
        PatternGuard::new().check(code).violated_pattern
    }

    #[test]
    fn accepts_plain_code() {
        let verdict = PatternGuard::new().check("function main() { return [1, 2].map(x => x * 2); }");
        assert!(verdict.allowed);
        assert!(verdict.violated_pattern.is_none());
    }

    #[test]
    fn accepts_empty_code() {
        assert!(PatternGuard::new().check("").allowed);
    }

    #[test]
    fn rejects_fetch_anywhere() {
        let code = r#"function main() { return 1; } // fetch("https://example.com")"#;
        let verdict = PatternGuard::new().check(code);
        assert!(!verdict.allowed);
        assert_eq!(verdict.violated_pattern.as_deref(), Some("fetch("));
    }

    #[test]
    fn rejects_dynamic_import_and_require() {
        assert_eq!(rejected_by(r#"const m = await import("fs");"#).as_deref(), Some("import("));
        assert_eq!(rejected_by(r#"const fs = require("fs");"#).as_deref(), Some("require("));
    }

    #[test]
    fn rejects_storage_and_dom() {
        assert!(rejected_by("localStorage.setItem('a', 1)").is_some());
        assert!(rejected_by("document.body.innerHTML = ''").is_some());
        assert!(rejected_by("window.location = 'x'").is_some());
        assert!(rejected_by(r#"globalThis["eval"]("1")"#).is_some());
    }

    #[test]
    fn rejects_process_and_subprocess() {
        assert!(rejected_by("process.exit(1)").is_some());
        assert!(rejected_by("const cp = child_process;").is_some());
        assert!(rejected_by("spawn('ls')").is_some());
        assert!(rejected_by("exec('rm -rf /')").is_some());
    }

    #[test]
    fn standalone_patterns_skip_identifiers() {
        assert!(rejected_by("const prefs = {}; prefs.theme = 'dark';").is_none());
        assert!(rejected_by("/a+/.exec('aaa')").is_none());
        assert!(rejected_by("respawn(3)").is_none());
        assert_eq!(rejected_by("fs.readdir('/')").as_deref(), Some("fs."));
        assert_eq!(rejected_by("x; fs.stat('/')").as_deref(), Some("fs."));
    }

    #[test]
    fn code_construction_matches_whole_identifiers() {
        assert!(rejected_by("function hashFunction(s) { return s.length; }").is_none());
        assert!(rejected_by("function retrieval(x) { return x; }").is_none());
        assert!(rejected_by("const medieval = (y) => y; medieval(1);").is_none());

        assert_eq!(rejected_by("eval('1 + 1')").as_deref(), Some("eval("));
        assert_eq!(rejected_by("x = (eval)('1') + eval(\"2\")").as_deref(), Some("eval("));
        assert_eq!(rejected_by("new Function('return 1')").as_deref(), Some("Function("));
        assert_eq!(
            rejected_by("globalThis.Function('return this')()").as_deref(),
            Some("Function(")
        );
    }

    #[test]
    fn extra_patterns_are_enforced() {
        let guard = PatternGuard::new().with_extra_patterns(["Math.random", ""]);
        assert!(!guard.check("Math.random()").allowed);
        assert_eq!(guard.patterns().filter(|p| p.is_empty()).count(), 0);
    }
}
