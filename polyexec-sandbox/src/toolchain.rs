//! Compiler and interpreter discovery
//!
//! Toolchains are resolved once when the dispatcher is built and shared by
//! every execution afterwards. A toolchain that cannot be found is kept as
//! unavailable so that requests for its language fail with an internal error
//! instead of failing to start a process on every call.

use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Placeholder replaced by the source file path
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder replaced by the artifact path (compiled languages only)
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// Program plus argument template, as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn mentions(&self, placeholder: &str) -> bool {
        self.args.iter().any(|arg| arg.contains(placeholder))
    }

    /// Expand placeholders into an argument vector.
    ///
    /// Each template entry stays exactly one argument; paths are never split or quoted.
    pub fn expand(&self, source: &Path, artifact: Option<&Path>) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| expand_arg(arg, source, artifact))
            .collect()
    }
}

fn expand_arg(arg: &str, source: &Path, artifact: Option<&Path>) -> OsString {
    if arg == SOURCE_PLACEHOLDER {
        return source.as_os_str().to_owned();
    }
    if let Some(artifact) = artifact {
        if arg == ARTIFACT_PLACEHOLDER {
            return artifact.as_os_str().to_owned();
        }
    }

    let mut expanded = arg.replace(SOURCE_PLACEHOLDER, &source.to_string_lossy());
    if let Some(artifact) = artifact {
        expanded = expanded.replace(ARTIFACT_PLACEHOLDER, &artifact.to_string_lossy());
    }
    OsString::from(expanded)
}

/// A language's compiler or interpreter, resolved at startup
#[derive(Debug, Clone)]
pub struct Toolchain {
    language: Language,
    template: CommandTemplate,
    resolved: Result<PathBuf, String>,
}

impl Toolchain {
    /// Look up `template.program` on the sandbox search path, then on the host `PATH`
    pub fn resolve(language: Language, template: CommandTemplate, search_path: &OsStr) -> Self {
        let resolved = which::which_in(&template.program, Some(search_path), "/")
            .or_else(|_| which::which(&template.program))
            .map_err(|e| e.to_string());

        match &resolved {
            Ok(path) => tracing::debug!(%language, program = %path.display(), "Resolved toolchain"),
            Err(e) => tracing::warn!(
                %language,
                program = %template.program,
                "Toolchain not found: {}",
                e
            ),
        }

        Self {
            language,
            template,
            resolved,
        }
    }

    /// Toolchain with an already known program path
    pub fn at(language: Language, path: impl Into<PathBuf>, args: &[&str]) -> Self {
        let path = path.into();
        Self {
            language,
            template: CommandTemplate::new(path.to_string_lossy(), args),
            resolved: Ok(path),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    pub fn is_available(&self) -> bool {
        self.resolved.is_ok()
    }

    /// Resolved program, or a message explaining why it is unavailable
    pub fn program(&self) -> Result<&Path, String> {
        self.resolved.as_deref().map_err(|e| {
            format!(
                "Toolchain '{}' for {} is not available: {}",
                self.template.program,
                self.language.display_name(),
                e
            )
        })
    }

    pub fn status(&self) -> ToolchainStatus {
        ToolchainStatus {
            language: self.language,
            program: self.template.program.clone(),
            resolved: self.resolved.as_ref().ok().cloned(),
            error: self.resolved.as_ref().err().cloned(),
        }
    }
}

/// Serializable view of a toolchain, for reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainStatus {
    pub language: Language,
    pub program: String,
    pub resolved: Option<PathBuf>,
    pub error: Option<String>,
}
