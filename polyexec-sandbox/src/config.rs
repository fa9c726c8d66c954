//! Configuration for the execution backend

use crate::error::{Result, SandboxError};
use crate::invoker::DEFAULT_SANDBOX_PATH;
use crate::language::{Language, RunnerKind};
use crate::limits::ResourceLimits;
use crate::toolchain::{CommandTemplate, ARTIFACT_PLACEHOLDER, SOURCE_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub toolchains: ToolchainsConfig,
}

/// Where per-execution workspaces are created
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Shared scratch area (default: `<system temp>/polyexec`)
    pub scratch_dir: Option<PathBuf>,
}

/// Worker pool and admission queue sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Executions running at the same time
    #[serde(default = "PoolConfig::default_workers")]
    pub workers: usize,
    /// Requests allowed to wait for a worker before new ones are rejected
    #[serde(default = "PoolConfig::default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: Self::default_workers(),
            queue_depth: Self::default_queue_depth(),
        }
    }
}

impl PoolConfig {
    fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    fn default_queue_depth() -> usize {
        64
    }
}

/// Limits for the compile and run phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "ResourceLimits::compile")]
    pub compile: ResourceLimits,
    #[serde(default = "ResourceLimits::run")]
    pub run: ResourceLimits,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            compile: ResourceLimits::compile(),
            run: ResourceLimits::run(),
        }
    }
}

/// Environment given to child processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// `PATH` for children, also searched first when resolving toolchains
    #[serde(default = "SandboxConfig::default_path")]
    pub path: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

impl SandboxConfig {
    fn default_path() -> String {
        DEFAULT_SANDBOX_PATH.to_string()
    }
}

/// Compiler/interpreter command per language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolchainsConfig {
    #[serde(default = "ToolchainsConfig::default_cpp")]
    pub cpp: CommandTemplate,
    #[serde(default = "ToolchainsConfig::default_python")]
    pub python: CommandTemplate,
    #[serde(default = "ToolchainsConfig::default_javascript")]
    pub javascript: CommandTemplate,
}

impl Default for ToolchainsConfig {
    fn default() -> Self {
        Self {
            cpp: Self::default_cpp(),
            python: Self::default_python(),
            javascript: Self::default_javascript(),
        }
    }
}

impl ToolchainsConfig {
    fn default_cpp() -> CommandTemplate {
        CommandTemplate::new(
            "g++",
            &["-std=c++17", "-O2", "-pipe", "{source}", "-o", "{artifact}"],
        )
    }

    fn default_python() -> CommandTemplate {
        CommandTemplate::new("python3", &["{source}"])
    }

    fn default_javascript() -> CommandTemplate {
        CommandTemplate::new("node", &["{source}"])
    }

    pub fn get(&self, language: Language) -> &CommandTemplate {
        match language {
            Language::Cpp => &self.cpp,
            Language::Python => &self.python,
            Language::JavaScript => &self.javascript,
        }
    }
}

impl ExecutorConfig {
    /// Load from the default location, falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SandboxError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ExecutorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Write this configuration as TOML, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SandboxError::ConfigIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|source| SandboxError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `<config dir>/polyexec/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("polyexec").join("config.toml"))
    }

    /// Effective scratch directory
    pub fn scratch_dir(&self) -> PathBuf {
        self.workspace
            .scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("polyexec"))
    }

    /// Apply `POLYEXEC_*` environment variables on top of file values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("POLYEXEC_WORKERS") {
            self.pool.workers = parse_env("POLYEXEC_WORKERS", &value)?;
        }
        if let Some(value) = lookup("POLYEXEC_QUEUE_DEPTH") {
            self.pool.queue_depth = parse_env("POLYEXEC_QUEUE_DEPTH", &value)?;
        }
        if let Some(value) = lookup("POLYEXEC_SCRATCH_DIR") {
            self.workspace.scratch_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("POLYEXEC_RUN_TIMEOUT") {
            self.limits.run.max_duration = parse_duration("POLYEXEC_RUN_TIMEOUT", &value)?;
        }
        if let Some(value) = lookup("POLYEXEC_COMPILE_TIMEOUT") {
            self.limits.compile.max_duration =
                parse_duration("POLYEXEC_COMPILE_TIMEOUT", &value)?;
        }
        Ok(())
    }

    /// Reject values the backend cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(SandboxError::Config(
                "pool.workers must be greater than zero".to_string(),
            ));
        }
        for (phase, limits) in [("compile", &self.limits.compile), ("run", &self.limits.run)] {
            if limits.max_duration.is_zero() {
                return Err(SandboxError::Config(format!(
                    "limits.{}.max_duration must be greater than zero",
                    phase
                )));
            }
        }
        for language in Language::ALL {
            let template = self.toolchains.get(language);
            if template.program.trim().is_empty() {
                return Err(SandboxError::Config(format!(
                    "toolchains.{}.program is empty",
                    language
                )));
            }
            if !template.mentions(SOURCE_PLACEHOLDER) {
                return Err(SandboxError::Config(format!(
                    "toolchains.{}.args must contain {}",
                    language, SOURCE_PLACEHOLDER
                )));
            }
            if language.kind() == RunnerKind::Compiled && !template.mentions(ARTIFACT_PLACEHOLDER)
            {
                return Err(SandboxError::Config(format!(
                    "toolchains.{}.args must contain {}",
                    language, ARTIFACT_PLACEHOLDER
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SandboxError::Config(format!("{} has invalid value '{}'", key, value)))
}

fn parse_duration(key: &str, value: &str) -> Result<std::time::Duration> {
    humantime_serde::re::humantime::parse_duration(value.trim())
        .map_err(|e| SandboxError::Config(format!("{} has invalid duration '{}': {}", key, value, e)))
}
