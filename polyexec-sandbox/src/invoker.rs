//! Process invoker - spawns one external program and supervises it
//!
//! Commands are always built from an argument vector and never pass through a
//! shell. Stdout and stderr of the child share the write end of one pipe, so
//! the captured text keeps the order in which the program wrote it. Only the
//! first `max_output_bytes` are kept; the rest is read and discarded so the
//! program never blocks on a full pipe.

use crate::limits::ResourceLimits;
use crate::types::ProcessOutcome;
use std::ffi::{OsStr, OsString};
use std::os::fd::{FromRawFd, OwnedFd};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::process::Command;

/// Search path handed to every child process
pub const DEFAULT_SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// How long the output pipe may stay open after the process group is gone
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// One external command to run
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    /// Resolved path of the program
    pub program: &'a Path,

    /// Arguments, passed verbatim
    pub args: Vec<OsString>,

    /// File bound to stdin; `None` means `/dev/null`
    pub stdin: Option<&'a Path>,

    pub working_dir: &'a Path,

    pub limits: &'a ResourceLimits,
}

/// Spawns external programs with bounded time and captured output
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    search_path: OsString,
}

impl ProcessInvoker {
    pub fn new() -> Self {
        Self::with_search_path(DEFAULT_SANDBOX_PATH)
    }

    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: search_path.into(),
        }
    }

    pub fn search_path(&self) -> &OsStr {
        &self.search_path
    }

    /// Run `invocation` to completion or until its wall-clock budget runs out
    pub async fn invoke(&self, invocation: Invocation<'_>) -> ProcessOutcome {
        let program = invocation.program.display().to_string();
        let start = Instant::now();

        let (mut command, mut reader) = match self.build_command(&invocation) {
            Ok(prepared) => prepared,
            Err(e) => {
                return ProcessOutcome::not_started(format!(
                    "Failed to prepare {}: {}",
                    program, e
                ))
            }
        };

        let spawned = command.spawn();
        // The command still owns the parent's copies of the pipe's write end.
        drop(command);
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(program = %program, "Failed to spawn process: {}", e);
                return ProcessOutcome::not_started(format!("Failed to start {}: {}", program, e));
            }
        };

        // Declared after `child` so it is dropped first if this future is cancelled,
        // while the group leader is still unreaped.
        let group = ProcessGroup::new(child.id());
        tracing::debug!(pid = ?child.id(), program = %program, "Spawned process");

        let mut capture = Capture::default();
        let mut drain = Box::pin(capture.drain(&mut reader, invocation.limits.max_output_bytes));
        let mut drained: Option<std::io::Result<()>> = None;

        let waited = tokio::time::timeout(invocation.limits.max_duration, async {
            loop {
                tokio::select! {
                    status = child.wait() => break status,
                    result = &mut drain, if drained.is_none() => drained = Some(result),
                }
            }
        })
        .await;

        let mut timed_out = false;
        let status = match waited {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => {
                group.kill();
                if let Err(reap) = child.wait().await {
                    tracing::warn!(program = %program, "Failed to reap process: {}", reap);
                }
                Err(e)
            }
            Err(_) => {
                timed_out = true;
                tracing::debug!(
                    program = %program,
                    budget_ms = invocation.limits.max_duration.as_millis() as u64,
                    "Process exceeded wall-clock budget, killing group"
                );
                group.kill();
                child.wait().await
            }
        };

        // Dropping the guard sweeps anything the program left running in its group,
        // which also closes their copies of the pipe.
        drop(group);

        if drained.is_none() {
            match tokio::time::timeout(DRAIN_GRACE, &mut drain).await {
                Ok(result) => drained = Some(result),
                Err(_) => tracing::warn!(
                    program = %program,
                    "Output pipe still open after the process group exited, closing it"
                ),
            }
        }
        drop(drain);
        if let Some(Err(e)) = drained {
            tracing::warn!(program = %program, "Failed to read captured output: {}", e);
        }

        let duration = start.elapsed();
        let mut outcome = ProcessOutcome {
            did_start: true,
            timed_out,
            duration,
            combined_output: String::from_utf8_lossy(&capture.kept).into_owned(),
            output_truncated: capture.truncated,
            ..Default::default()
        };

        match status {
            Ok(status) => record_status(&mut outcome, status),
            Err(e) => {
                outcome.combined_output = format!("Failed to wait for {}: {}", program, e);
                return outcome;
            }
        }

        tracing::debug!(
            program = %program,
            exit_code = ?outcome.exit_code,
            signal = ?outcome.signal,
            timed_out = outcome.timed_out,
            output_truncated = outcome.output_truncated,
            duration_ms = duration.as_millis() as u64,
            "Process finished"
        );

        outcome
    }

    fn build_command(
        &self,
        invocation: &Invocation<'_>,
    ) -> std::io::Result<(Command, pipe::Receiver)> {
        let (reader, output) = capture_pipe()?;
        let errors = output.try_clone()?;
        let stdin = match invocation.stdin {
            Some(path) => Stdio::from(std::fs::File::open(path)?),
            None => Stdio::null(),
        };

        let mut command = Command::new(invocation.program);
        command
            .args(&invocation.args)
            .current_dir(invocation.working_dir)
            .env_clear()
            .env("PATH", &self.search_path)
            .env("HOME", invocation.working_dir)
            .env("TMPDIR", invocation.working_dir)
            .env("LANG", "C.UTF-8")
            .stdin(stdin)
            .stdout(Stdio::from(output))
            .stderr(Stdio::from(errors))
            .kill_on_drop(true);

        let plan = rlimit::RlimitPlan::from_limits(invocation.limits);
        command.process_group(0);
        // SAFETY: the hook only issues getrlimit/setrlimit syscalls and does not allocate.
        unsafe {
            command.pre_exec(move || plan.apply());
        }

        Ok((command, reader))
    }
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new()
    }
}

fn record_status(outcome: &mut ProcessOutcome, status: ExitStatus) {
    use std::os::unix::process::ExitStatusExt;

    outcome.exit_code = status.code();
    outcome.signal = status.signal();
    if outcome.signal == Some(libc::SIGXCPU) {
        outcome.cpu_limit_exceeded = true;
    }
}

/// Anonymous pipe: an async read end for us, a blocking write end for the child
fn capture_pipe() -> std::io::Result<(pipe::Receiver, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [0; 2];

    #[cfg(target_os = "linux")]
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    #[cfg(not(target_os = "linux"))]
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: both descriptors were just created and nothing else owns them.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    #[cfg(not(target_os = "linux"))]
    for fd in [&read, &write] {
        use std::os::fd::AsRawFd;
        if unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFD, libc::FD_CLOEXEC) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let reader = pipe::Receiver::from_file(std::fs::File::from(read))?;
    Ok((reader, write))
}

/// Bytes kept from the output pipe
#[derive(Debug, Default)]
struct Capture {
    kept: Vec<u8>,
    truncated: bool,
}

impl Capture {
    /// Keep the first `limit` bytes and discard the rest until end of file
    async fn drain(&mut self, reader: &mut pipe::Receiver, limit: u64) -> std::io::Result<()> {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut chunk = [0u8; 8192];
        loop {
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                return Ok(());
            }
            let room = limit.saturating_sub(self.kept.len());
            if read > room {
                self.truncated = true;
            }
            self.kept.extend_from_slice(&chunk[..read.min(room)]);
        }
    }
}

/// Kills a child's whole process group
struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    fn kill(&self) {
        if let Some(pgid) = self.pgid {
            // ESRCH just means the group is already gone.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

mod rlimit {
    use crate::limits::ResourceLimits;

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    type Resource = libc::c_int;

    /// Limits applied in the child between fork and exec
    #[derive(Debug, Clone, Copy)]
    pub(super) struct RlimitPlan {
        cpu_secs: Option<u64>,
        address_space: Option<u64>,
        file_size: Option<u64>,
    }

    impl RlimitPlan {
        pub(super) fn from_limits(limits: &ResourceLimits) -> Self {
            Self {
                cpu_secs: limits.cpu_time_secs(),
                address_space: limits.max_memory_bytes,
                file_size: limits.max_file_size_bytes,
            }
        }

        pub(super) fn apply(&self) -> std::io::Result<()> {
            set(libc::RLIMIT_CORE, 0, 0)?;
            if let Some(secs) = self.cpu_secs {
                // SIGXCPU at the soft limit, SIGKILL one second later.
                set(libc::RLIMIT_CPU, secs, secs + 1)?;
            }
            if let Some(bytes) = self.address_space {
                set(libc::RLIMIT_AS, bytes, bytes)?;
            }
            if let Some(bytes) = self.file_size {
                set(libc::RLIMIT_FSIZE, bytes, bytes)?;
            }
            Ok(())
        }
    }

    /// Lower a limit, never above the current hard limit
    fn set(resource: Resource, soft: u64, hard: u64) -> std::io::Result<()> {
        let mut current = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
            return Err(std::io::Error::last_os_error());
        }

        let hard = (hard as libc::rlim_t).min(current.rlim_max);
        let soft = (soft as libc::rlim_t).min(hard);
        let limit = libc::rlimit {
            rlim_cur: soft,
            rlim_max: hard,
        };
        if unsafe { libc::setrlimit(resource, &limit) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}
