//! Supported submission languages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages a learner submission can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// JavaScript, run in an embedded V8 isolate
    JavaScript,
    /// Python, demo stub or local interpreter
    Python,
    /// Go, textual simulator
    Go,
}

impl Language {
    /// Get all supported languages
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::JavaScript, Self::Python, Self::Go]
    }

    /// Parse a case-insensitive language name or alias
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Some(Self::JavaScript),
            "python" | "py" | "python3" => Some(Self::Python),
            "go" | "golang" => Some(Self::Go),
            _ => None,
        }
    }

    /// Guess the language from a file extension (without the dot)
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" => Some(Self::Python),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Get the canonical language name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Go => "go",
        }
    }

    /// Get the display name
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::Python => "Python",
            Self::Go => "Go",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A language name outside the supported set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Language {0} not supported")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnsupportedLanguage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_are_case_insensitive() {
        assert_eq!(Language::parse("JavaScript"), Some(Language::JavaScript));
        assert_eq!(Language::parse("JS"), Some(Language::JavaScript));
        assert_eq!(Language::parse(" py "), Some(Language::Python));
        assert_eq!(Language::parse("PYTHON"), Some(Language::Python));
        assert_eq!(Language::parse("Go"), Some(Language::Go));
        assert_eq!(Language::parse("golang"), Some(Language::Go));
    }

    #[test]
    fn test_unknown_language() {
        assert_eq!(Language::parse("ruby"), None);
        let err = "ruby".parse::<Language>().unwrap_err();
        assert_eq!(err.to_string(), "Language ruby not supported");
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("mjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("GO"), Some(Language::Go));
        assert_eq!(Language::from_extension("rb"), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Language::JavaScript).unwrap();
        assert_eq!(json, "\"javascript\"");
        let parsed: Language = serde_json::from_str("\"go\"").unwrap();
        assert_eq!(parsed, Language::Go);
    }
}
