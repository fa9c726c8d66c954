//! Language runners - per-language strategies for compiling and running code

mod compiled;
mod interpreted;

use crate::invoker::ProcessInvoker;
use crate::language::{Language, RunnerKind};
use crate::limits::ResourceLimits;
use crate::toolchain::Toolchain;
use crate::types::{ErrorKind, ExecutionResult, ProcessOutcome};
use async_trait::async_trait;
use std::path::PathBuf;

pub use compiled::CompiledRunner;
pub use interpreted::InterpretedRunner;

/// Runner abstraction for one language.
///
/// Implementations are stateless: every call creates and destroys its own
/// workspace, so one runner can serve any number of concurrent requests.
#[async_trait]
pub trait LanguageRunner: Send + Sync {
    fn language(&self) -> Language;

    fn kind(&self) -> RunnerKind;

    /// Toolchain backing this runner, if it uses one
    fn toolchain(&self) -> Option<&Toolchain> {
        None
    }

    /// Execute `code` with `stdin` and classify the outcome. Never fails.
    async fn run(&self, code: &str, stdin: &str) -> ExecutionResult;
}

/// Immutable settings shared by all runners
#[derive(Debug, Clone)]
pub struct RunnerContext {
    pub invoker: ProcessInvoker,

    /// Parent directory for per-execution workspaces
    pub scratch_dir: PathBuf,

    pub compile_limits: ResourceLimits,

    pub run_limits: ResourceLimits,
}

impl RunnerContext {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            invoker: ProcessInvoker::new(),
            scratch_dir: scratch_dir.into(),
            compile_limits: ResourceLimits::compile(),
            run_limits: ResourceLimits::run(),
        }
    }
}

/// Turn the outcome of running a program (artifact or interpreter) into a result
pub(crate) fn classify_run(
    language: Language,
    outcome: &ProcessOutcome,
    limits: &ResourceLimits,
) -> ExecutionResult {
    if !outcome.did_start {
        return ExecutionResult::internal_error(Some(language), outcome.combined_output.clone());
    }

    if outcome.timed_out || outcome.cpu_limit_exceeded {
        return ExecutionResult::failure(
            Some(language),
            ErrorKind::Timeout,
            timeout_message("Time limit exceeded", outcome, limits),
        );
    }

    if outcome.exit_code != Some(0) {
        let output = outcome.output_with_marker();
        let output = if output.trim().is_empty() {
            outcome.status_description()
        } else {
            output
        };
        return ExecutionResult::failure(Some(language), ErrorKind::RuntimeError, output);
    }

    ExecutionResult::success(language, outcome.output_with_marker())
}

/// Diagnostic for a killed process, followed by whatever it printed before
pub(crate) fn timeout_message(
    headline: &str,
    outcome: &ProcessOutcome,
    limits: &ResourceLimits,
) -> String {
    let mut message = if outcome.cpu_limit_exceeded && !outcome.timed_out {
        format!(
            "{}: CPU time exceeded {} ms",
            headline,
            limits.max_cpu_time_ms.unwrap_or_default()
        )
    } else {
        format!(
            "{} after {} ms",
            headline,
            limits.max_duration.as_millis()
        )
    };

    let partial = outcome.output_with_marker();
    if !partial.is_empty() {
        message.push_str("\n\n");
        message.push_str(&partial);
    }
    message
}
