//! Core types for code execution

use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output reported for a successful run that printed nothing
pub const NO_OUTPUT: &str = "No output";

/// Marker appended when captured output exceeded the configured limit
pub const TRUNCATED_MARKER: &str = "[output truncated]";

/// Request to execute code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The code to execute
    #[serde(alias = "code")]
    pub source_code: String,

    /// Language identifier as received from the caller (e.g. "cpp", "python")
    pub language: String,

    /// Text fed to the program on standard input
    #[serde(default, alias = "input")]
    pub stdin: String,
}

impl ExecutionRequest {
    /// Create a request with empty stdin
    pub fn new(language: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            language: language.into(),
            stdin: String::new(),
        }
    }

    /// Set standard input
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }
}

/// Classification of a failed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    /// Source did not produce a runnable artifact
    CompileError,
    /// Program or interpreter ran but signaled failure
    RuntimeError,
    /// Wall-clock budget exceeded; the process was killed
    Timeout,
    /// Fault unrelated to the submitted code (toolchain, workspace, language, overload)
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::CompileError => "compile_error",
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of code execution, the only value crossing the public boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// `true` exactly when `error_kind` is `None`
    pub success: bool,

    /// Program output, or a diagnostic when `success` is false
    pub output: String,

    pub error_kind: ErrorKind,

    /// `None` only when the request named an unknown language
    pub language: Option<Language>,

    /// Wall-clock time spent on the execution
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Successful run; empty output becomes the `NO_OUTPUT` sentinel
    pub fn success(language: Language, output: impl Into<String>) -> Self {
        let output = output.into();
        let output = if output.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            output
        };
        Self {
            success: true,
            output,
            error_kind: ErrorKind::None,
            language: Some(language),
            duration_ms: 0,
        }
    }

    /// Failed run. Empty diagnostics are replaced so callers always have text to show.
    pub fn failure(
        language: Option<Language>,
        error_kind: ErrorKind,
        output: impl Into<String>,
    ) -> Self {
        debug_assert!(error_kind != ErrorKind::None);
        let output = output.into();
        let output = if output.trim().is_empty() {
            format!("Execution failed: {}", error_kind)
        } else {
            output
        };
        Self {
            success: false,
            output,
            error_kind,
            language,
            duration_ms: 0,
        }
    }

    pub fn internal_error(language: Option<Language>, message: impl Into<String>) -> Self {
        Self::failure(language, ErrorKind::InternalError, message)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    /// Whether a successful run printed nothing
    pub fn is_no_output(&self) -> bool {
        self.success && self.output == NO_OUTPUT
    }
}

/// What the invoker observed about one external process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    /// Exit code, `None` when killed by a signal or never started
    pub exit_code: Option<i32>,

    /// Terminating signal, if any
    pub signal: Option<i32>,

    /// Stdout and stderr merged in emission order; the start failure when `did_start` is false
    pub combined_output: String,

    pub timed_out: bool,

    pub did_start: bool,

    /// Output beyond `ResourceLimits::max_output_bytes` was discarded
    pub output_truncated: bool,

    /// Killed for exceeding `ResourceLimits::max_cpu_time_ms`
    pub cpu_limit_exceeded: bool,

    pub duration: Duration,
}

impl ProcessOutcome {
    /// Outcome for a process that could not be spawned
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            combined_output: reason.into(),
            ..Default::default()
        }
    }

    /// Exited on its own with status 0
    pub fn exited_cleanly(&self) -> bool {
        self.did_start && !self.timed_out && self.exit_code == Some(0)
    }

    /// Human readable termination status
    pub fn status_description(&self) -> String {
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("Process exited with status {}", code),
            (None, Some(signal)) => format!("Process terminated by signal {}", signal),
            (None, None) => "Process terminated abnormally".to_string(),
        }
    }

    /// Captured output with the truncation marker appended when needed
    pub fn output_with_marker(&self) -> String {
        if !self.output_truncated {
            return self.combined_output.clone();
        }
        let mut output = self.combined_output.clone();
        if !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(TRUNCATED_MARKER);
        output
    }
}
