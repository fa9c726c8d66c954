//! Supported languages and how they are executed

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of languages the backend can execute.
///
/// Adding a variant is a versioned change of the public request contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Python,
    JavaScript,
}

/// How a language turns source into a running process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Source is compiled to an artifact, then the artifact is executed
    Compiled,
    /// Source is handed directly to an interpreter
    Interpreted,
}

impl Language {
    /// All supported languages, in display order
    pub const ALL: [Language; 3] = [Language::Cpp, Language::Python, Language::JavaScript];

    /// Canonical identifier used on the wire
    pub fn id(self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python => "python",
            Language::JavaScript => "javascript",
        }
    }

    /// Human readable name
    pub fn display_name(self) -> &'static str {
        match self {
            Language::Cpp => "C++",
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
        }
    }

    /// Source file extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Python => "py",
            Language::JavaScript => "js",
        }
    }

    pub fn kind(self) -> RunnerKind {
        match self {
            Language::Cpp => RunnerKind::Compiled,
            Language::Python | Language::JavaScript => RunnerKind::Interpreted,
        }
    }

    /// Guess the language from a file extension (`"cc"`, `"py"`, ...)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "cpp" | "cc" | "cxx" | "c++" => Some(Language::Cpp),
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Compiled => f.write_str("compiled"),
            RunnerKind::Interpreted => f.write_str("interpreted"),
        }
    }
}

/// Returned when a language identifier is not part of the supported set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}
