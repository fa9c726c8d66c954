//! Common test utilities shared across integration and E2E tests

use polyexec_sandbox::{ExecutionDispatcher, ExecutorConfig, Language};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("polyexec=debug")
        .with_test_writer()
        .try_init();
}

/// Backend configuration rooted in a private scratch directory
pub struct TestEnv {
    pub scratch: TempDir,
    pub config: ExecutorConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        setup_test_logging();
        let scratch = tempfile::tempdir().expect("Failed to create scratch dir");
        let mut config = ExecutorConfig::default();
        config.workspace.scratch_dir = Some(scratch.path().join("work"));
        Self { scratch, config }
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.config.limits.run.max_duration = timeout;
        self
    }

    pub fn dispatcher(&self) -> ExecutionDispatcher {
        ExecutionDispatcher::from_config(&self.config)
    }

    /// Workspaces currently present in the scratch directory
    pub fn workspaces_left(&self) -> usize {
        entries(&self.scratch.path().join("work"))
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// Whether the host has the configured toolchain for `language`
pub fn toolchain_available(config: &ExecutorConfig, language: Language) -> bool {
    ExecutionDispatcher::from_config(config)
        .toolchain_report()
        .iter()
        .any(|status| status.language == language && status.resolved.is_some())
}

/// Skip the current test when a toolchain is missing from the host
#[macro_export]
macro_rules! require_toolchain {
    ($env:expr, $language:expr) => {
        if !$crate::common::toolchain_available(&$env.config, $language) {
            eprintln!("skipping: no {} toolchain on this host", $language);
            return;
        }
    };
}

/// Whether a process with this pid is still running. Zombies count as gone.
pub fn process_exists(pid: i32) -> bool {
    // SAFETY: signal 0 only checks for existence and permission.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .and_then(|(_, rest)| rest.chars().next())
            .map_or(true, |state| state != 'Z'),
        Err(_) => true,
    }
}

/// Wait until `pid` is gone, giving the runtime time to reap it
pub async fn wait_for_exit(pid: i32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !process_exists(pid)
}

/// First line of `output` that parses as a pid
pub fn find_pid(output: &str) -> Option<i32> {
    output.lines().find_map(|line| line.trim().parse().ok())
}
