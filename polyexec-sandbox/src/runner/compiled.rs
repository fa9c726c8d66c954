//! Runner for languages that compile to a native artifact

use super::{classify_run, timeout_message, LanguageRunner, RunnerContext};
use crate::error::Result;
use crate::invoker::Invocation;
use crate::language::{Language, RunnerKind};
use crate::toolchain::Toolchain;
use crate::types::{ErrorKind, ExecutionResult};
use crate::workspace::TempWorkspace;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Compiles source with the language's compiler, then runs the artifact
#[derive(Debug, Clone)]
pub struct CompiledRunner {
    compiler: Toolchain,
    context: Arc<RunnerContext>,
}

impl CompiledRunner {
    pub fn new(compiler: Toolchain, context: Arc<RunnerContext>) -> Self {
        Self { compiler, context }
    }

    async fn execute(&self, code: &str, stdin: &str) -> Result<ExecutionResult> {
        let language = self.language();
        let compiler = match self.compiler.program() {
            Ok(path) => path,
            Err(message) => return Ok(ExecutionResult::internal_error(Some(language), message)),
        };

        let mut workspace = TempWorkspace::acquire(&self.context.scratch_dir, language)?;
        let result = self.compile_and_run(&workspace, compiler, code, stdin).await;

        if let Err(e) = workspace.release() {
            tracing::warn!(%language, "Failed to release workspace: {}", e);
        }
        result
    }

    async fn compile_and_run(
        &self,
        workspace: &TempWorkspace,
        compiler: &std::path::Path,
        code: &str,
        stdin: &str,
    ) -> Result<ExecutionResult> {
        let language = self.language();
        workspace.write_source(code).await?;
        workspace.write_input(stdin).await?;

        let Some(artifact) = workspace.artifact_file() else {
            return Ok(ExecutionResult::internal_error(
                Some(language),
                format!("No artifact path for {}", language.display_name()),
            ));
        };

        let compile_limits = &self.context.compile_limits;
        let compile = self
            .context
            .invoker
            .invoke(Invocation {
                program: compiler,
                args: self
                    .compiler
                    .template()
                    .expand(workspace.source_file(), Some(artifact)),
                stdin: None,
                working_dir: workspace.root_dir(),
                limits: compile_limits,
            })
            .await;

        if !compile.did_start {
            return Ok(ExecutionResult::internal_error(
                Some(language),
                compile.combined_output,
            ));
        }

        if compile.timed_out || compile.cpu_limit_exceeded {
            return Ok(ExecutionResult::failure(
                Some(language),
                ErrorKind::Timeout,
                timeout_message("Compilation time limit exceeded", &compile, compile_limits),
            ));
        }

        // The artifact decides success: compilers can exit 0 without producing
        // one, or exit non-zero after writing one.
        if !workspace.artifact_exists().await {
            let diagnostics = compile.output_with_marker();
            let diagnostics = if diagnostics.trim().is_empty() {
                format!(
                    "Compilation failed without diagnostics ({})",
                    compile.status_description()
                )
            } else {
                diagnostics
            };
            tracing::debug!(%language, exit_code = ?compile.exit_code, "Compilation produced no artifact");
            return Ok(ExecutionResult::failure(
                Some(language),
                ErrorKind::CompileError,
                diagnostics,
            ));
        }

        let run_limits = &self.context.run_limits;
        let run = self
            .context
            .invoker
            .invoke(Invocation {
                program: artifact,
                args: Vec::new(),
                stdin: Some(workspace.input_file()),
                working_dir: workspace.root_dir(),
                limits: run_limits,
            })
            .await;

        Ok(classify_run(language, &run, run_limits))
    }
}

#[async_trait]
impl LanguageRunner for CompiledRunner {
    fn language(&self) -> Language {
        self.compiler.language()
    }

    fn kind(&self) -> RunnerKind {
        RunnerKind::Compiled
    }

    fn toolchain(&self) -> Option<&Toolchain> {
        Some(&self.compiler)
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
