//! Runtime capability reporting.
//!
//! Each executor describes whether it can run code on this host, so callers
//! can show which languages are live and which are placeholders.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Language;

/// Environment check results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentCheck {
    /// Language being checked
    pub language: Language,
    /// Whether submissions in this language actually execute
    pub available: bool,
    /// How the language is executed (`embedded`, `simulated`, `demo`, ...)
    pub mode: String,
    /// Version information if available
    pub version: Option<String>,
    /// Any warnings or setup hints
    pub notes: Vec<String>,
}

impl EnvironmentCheck {
    /// Check result for a runtime built into this binary
    #[must_use]
    pub fn embedded(language: Language) -> Self {
        let (mode, version, notes) = match language {
            Language::JavaScript => (
                "embedded",
                Some(format!("V8 {}", deno_core::v8::V8::get_version())),
                Vec::new(),
            ),
            Language::Go => (
                "simulated",
                None,
                vec!["Teaching subset only: package, import, var, :=, fmt.Println".to_string()],
            ),
            Language::Python => ("embedded", None, Vec::new()),
        };
        Self {
            language,
            available: true,
            mode: mode.to_string(),
            version,
            notes,
        }
    }
}

impl fmt::Display for EnvironmentCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.available { "available" } else { "unavailable" };
        write!(
            f,
            "{:<12} {:<12} {:<11}",
            self.language.display_name(),
            status,
            self.mode
        )?;
        if let Some(version) = &self.version {
            write!(f, " {version}")?;
        }
        for note in &self.notes {
            write!(f, "\n             {note}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_is_simulated() {
        let check = EnvironmentCheck::embedded(Language::Go);
        assert!(check.available);
        assert_eq!(check.mode, "simulated");
        assert!(check.version.is_none());
    }

    #[test]
    fn test_display_includes_notes() {
        let check = EnvironmentCheck {
            language: Language::Python,
            available: false,
            mode: "demo".to_string(),
            version: None,
            notes: vec!["hint".to_string()],
        };
        let text = check.to_string();
        assert!(text.starts_with("Python"));
        assert!(text.contains("unavailable"));
        assert!(text.ends_with("hint"));
    }
}
