//! Execution dispatcher - maps a language to its runner

use crate::config::ExecutorConfig;
use crate::execution::ExecutionId;
use crate::invoker::ProcessInvoker;
use crate::language::{Language, RunnerKind};
use crate::runner::{CompiledRunner, InterpretedRunner, LanguageRunner, RunnerContext};
use crate::toolchain::{Toolchain, ToolchainStatus};
use crate::types::{ExecutionRequest, ExecutionResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

/// Sole entry point of the execution core
#[derive(Clone, Default)]
pub struct ExecutionDispatcher {
    runners: HashMap<Language, Arc<dyn LanguageRunner>>,
}

impl ExecutionDispatcher {
    /// Dispatcher with no runners registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve toolchains once and register the built-in runners
    pub fn from_config(config: &ExecutorConfig) -> Self {
        let invoker = ProcessInvoker::with_search_path(&config.sandbox.path);
        let search_path = invoker.search_path().to_owned();
        let context = Arc::new(RunnerContext {
            invoker,
            scratch_dir: config.scratch_dir(),
            compile_limits: config.limits.compile.clone(),
            run_limits: config.limits.run.clone(),
        });

        let mut dispatcher = Self::new();
        for language in Language::ALL {
            let toolchain = Toolchain::resolve(
                language,
                config.toolchains.get(language).clone(),
                &search_path,
            );
            match language {
                Language::Cpp => {
                    dispatcher.register(CompiledRunner::new(toolchain, Arc::clone(&context)));
                }
                Language::Python => {
                    dispatcher.register(InterpretedRunner::new(toolchain, Arc::clone(&context)));
                }
                Language::JavaScript => {
                    dispatcher.register(
                        InterpretedRunner::new(toolchain, Arc::clone(&context))
                            .without_memory_limit(),
                    );
                }
            }
        }

        tracing::info!(
            scratch_dir = %context.scratch_dir.display(),
            languages = ?dispatcher.languages(),
            "Execution dispatcher ready"
        );
        dispatcher
    }

    /// Register (or replace) the runner for its language
    pub fn register(&mut self, runner: impl LanguageRunner + 'static) -> &mut Self {
        self.runners.insert(runner.language(), Arc::new(runner));
        self
    }

    /// Registered languages, in canonical order
    pub fn languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|language| self.runners.contains_key(language))
            .collect()
    }

    pub fn runner_kind(&self, language: Language) -> Option<RunnerKind> {
        self.runners.get(&language).map(|runner| runner.kind())
    }

    /// Toolchain status of every registered runner
    pub fn toolchain_report(&self) -> Vec<ToolchainStatus> {
        self.languages()
            .into_iter()
            .filter_map(|language| self.runners.get(&language))
            .filter_map(|runner| runner.toolchain().map(Toolchain::status))
            .collect()
    }

    /// Execute a request. Every failure is reported in the result; this never errors.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let id = ExecutionId::new();
        let span = tracing::info_span!(
            "execution",
            execution_id = %id,
            language = %request.language,
        );
        self.dispatch(request).instrument(span).await
    }

    async fn dispatch(&self, request: ExecutionRequest) -> ExecutionResult {
        let language = request.language.parse::<Language>().ok();
        let runner = language.and_then(|language| self.runners.get(&language));

        let Some(runner) = runner else {
            tracing::warn!("Rejected unsupported language");
            return ExecutionResult::internal_error(
                language,
                format!("Unsupported language: {}", request.language),
            );
        };

        tracing::debug!(
            code_len = request.source_code.len(),
            stdin_len = request.stdin.len(),
            "Executing code"
        );

        let result = runner.run(&request.source_code, &request.stdin).await;

        tracing::info!(
            success = result.success,
            error_kind = %result.error_kind,
            duration_ms = result.duration_ms,
            "Execution finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use async_trait::async_trait;

    struct EchoRunner;

    #[async_trait]
    impl LanguageRunner for EchoRunner {
        fn language(&self) -> Language {
            Language::Python
        }

        fn kind(&self) -> RunnerKind {
            RunnerKind::Interpreted
        }

        async fn run(&self, code: &str, stdin: &str) -> ExecutionResult {
            ExecutionResult::success(Language::Python, format!("{}|{}", code, stdin))
        }
    }

    #[tokio::test]
    async fn test_unknown_language_is_internal_error() {
        let dispatcher = ExecutionDispatcher::new();
        let result = dispatcher
            .execute(ExecutionRequest::new("brainfuck", "+++"))
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, ErrorKind::InternalError);
        assert_eq!(result.output, "Unsupported language: brainfuck");
        assert_eq!(result.language, None);
    }

    #[tokio::test]
    async fn test_known_language_without_runner_is_unsupported() {
        let dispatcher = ExecutionDispatcher::new();
        let result = dispatcher.execute(ExecutionRequest::new("cpp", "")).await;
        assert_eq!(result.error_kind, ErrorKind::InternalError);
        assert!(result.output.contains("Unsupported language: cpp"));
    }

    #[tokio::test]
    async fn test_delegates_to_runner_unchanged() {
        let mut dispatcher = ExecutionDispatcher::new();
        dispatcher.register(EchoRunner);

        let result = dispatcher
            .execute(ExecutionRequest::new("py", "print(1)").with_stdin("in"))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "print(1)|in");
        assert_eq!(dispatcher.languages(), vec![Language::Python]);
        assert_eq!(
            dispatcher.runner_kind(Language::Python),
            Some(RunnerKind::Interpreted)
        );
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_internal_error() {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = ExecutorConfig::default();
        config.workspace.scratch_dir = Some(scratch.path().to_path_buf());
        config.toolchains.cpp.program = "missing-cxx-91b2".to_string();

        let dispatcher = ExecutionDispatcher::from_config(&config);
        assert_eq!(dispatcher.languages(), Language::ALL.to_vec());

        let report = dispatcher.toolchain_report();
        let cpp = report
            .iter()
            .find(|status| status.language == Language::Cpp)
            .unwrap();
        assert!(cpp.resolved.is_none());

        let result = dispatcher
            .execute(ExecutionRequest::new("cpp", "int main() {}"))
            .await;
        assert_eq!(result.error_kind, ErrorKind::InternalError);
        assert!(result.output.contains("missing-cxx-91b2"));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
