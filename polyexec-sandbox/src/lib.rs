//! Polyexec Sandbox - multi-language code execution backend
//!
//! Accepts source code, a language name and optional stdin, then compiles
//! and/or runs the program as a contained process in a throwaway workspace.
//! Every request yields an [`ExecutionResult`]; host faults never leak out
//! as errors.

#[cfg(not(unix))]
compile_error!("polyexec-sandbox supervises processes through Unix process groups and rlimits");

mod config;
mod dispatcher;
mod error;
mod execution;
mod invoker;
mod language;
mod limits;
mod runner;
mod service;
mod toolchain;
mod types;
mod workspace;

pub use config::{
    ExecutorConfig, LimitsConfig, PoolConfig, SandboxConfig, ToolchainsConfig, WorkspaceConfig,
};
pub use dispatcher::ExecutionDispatcher;
pub use error::{Result, SandboxError};
pub use execution::ExecutionId;
pub use invoker::{Invocation, ProcessInvoker, DEFAULT_SANDBOX_PATH};
pub use language::{Language, RunnerKind, UnsupportedLanguage};
pub use limits::ResourceLimits;
pub use runner::{CompiledRunner, InterpretedRunner, LanguageRunner, RunnerContext};
pub use service::{ExecutionService, CANCELLED_MESSAGE, QUEUE_FULL_MESSAGE};
pub use toolchain::{CommandTemplate, Toolchain, ToolchainStatus};
pub use types::{
    ErrorKind, ExecutionRequest, ExecutionResult, ProcessOutcome, NO_OUTPUT, TRUNCATED_MARKER,
};
pub use workspace::TempWorkspace;

/// Re-exported so callers can cancel executions without a direct dependency
pub use tokio_util::sync::CancellationToken;
