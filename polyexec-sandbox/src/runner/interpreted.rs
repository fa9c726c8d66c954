//! Runner for languages executed directly by an interpreter

use super::{classify_run, LanguageRunner, RunnerContext};
use crate::error::Result;
use crate::invoker::Invocation;
use crate::language::{Language, RunnerKind};
use crate::limits::ResourceLimits;
use crate::toolchain::Toolchain;
use crate::types::ExecutionResult;
use crate::workspace::TempWorkspace;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Hands the source file to an interpreter, with stdin bound to the input file
#[derive(Debug, Clone)]
pub struct InterpretedRunner {
    interpreter: Toolchain,
    context: Arc<RunnerContext>,
    limits: ResourceLimits,
}

impl InterpretedRunner {
    pub fn new(interpreter: Toolchain, context: Arc<RunnerContext>) -> Self {
        let limits = context.run_limits.clone();
        Self {
            interpreter,
            context,
            limits,
        }
    }

    /// Skip the address space limit.
    ///
    /// V8 reserves several GiB of virtual memory at startup, so node aborts under RLIMIT_AS.
    pub fn without_memory_limit(mut self) -> Self {
        self.limits = self.limits.without_memory_limit();
        self
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    async fn execute(&self, code: &str, stdin: &str) -> Result<ExecutionResult> {
        let language = self.language();
        let interpreter = match self.interpreter.program() {
            Ok(path) => path,
            Err(message) => return Ok(ExecutionResult::internal_error(Some(language), message)),
        };

        let mut workspace = TempWorkspace::acquire(&self.context.scratch_dir, language)?;
        let result = self.interpret(&workspace, interpreter, code, stdin).await;

        if let Err(e) = workspace.release() {
            tracing::warn!(%language, "Failed to release workspace: {}", e);
        }
        result
    }

    async fn interpret(
        &self,
        workspace: &TempWorkspace,
        interpreter: &std::path::Path,
        code: &str,
        stdin: &str,
    ) -> Result<ExecutionResult> {
        workspace.write_source(code).await?;
        workspace.write_input(stdin).await?;

        let outcome = self
            .context
            .invoker
            .invoke(Invocation {
                program: interpreter,
                args: self
                    .interpreter
                    .template()
                    .expand(workspace.source_file(), None),
                stdin: Some(workspace.input_file()),
                working_dir: workspace.root_dir(),
                limits: &self.limits,
            })
            .await;

        Ok(classify_run(self.language(), &outcome, &self.limits))
    }
}

#[async_trait]
impl LanguageRunner for InterpretedRunner {
    fn language(&self) -> Language {
        self.interpreter.language()
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Interpreted
    }

    fn toolchain(&self) -> Option<&Toolchain> {
        Some(&self.interpreter)
    }

    async fn run(&self, code: &str, stdin: &str) -> ExecutionResult {
        let started = Instant::now();
        let result = match self.execute(code, stdin).await {
            Ok(result) => result,
            Err(e) => ExecutionResult::internal_error(Some(self.language()), e.to_string()),
        };
        result.with_duration(started.elapsed())
    }
}
