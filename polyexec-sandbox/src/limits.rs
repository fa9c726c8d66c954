//! Resource limits configuration for sandboxed execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

/// Resource limits for one external process (a compiler run or a program run).
///
/// In TOML an absent optional limit is written as `0`; fields missing from a
/// table fall back to the run defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Wall-clock budget before the process group is killed
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,

    /// Address space limit in bytes (RLIMIT_AS)
    #[serde(with = "unlimited_as_zero")]
    pub max_memory_bytes: Option<u64>,

    /// CPU time in milliseconds (RLIMIT_CPU, rounded up to whole seconds)
    #[serde(with = "unlimited_as_zero")]
    pub max_cpu_time_ms: Option<u64>,

    /// Largest file the process may write (RLIMIT_FSIZE)
    #[serde(with = "unlimited_as_zero")]
    pub max_file_size_bytes: Option<u64>,

    /// How much of the captured output is kept
    pub max_output_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::run()
    }
}

impl ResourceLimits {
    /// Defaults for running a program or script
    pub fn run() -> Self {
        Self {
            max_duration: Duration::from_secs(5),
            max_memory_bytes: Some(512 * MIB),
            max_cpu_time_ms: Some(5_000),
            max_file_size_bytes: Some(MIB),
            max_output_bytes: 64 * KIB,
        }
    }

    /// Defaults for a compiler invocation.
    ///
    /// No memory or file size limit: compilers map large files and write the artifact.
    pub fn compile() -> Self {
        Self {
            max_duration: Duration::from_secs(30),
            max_memory_bytes: None,
            max_cpu_time_ms: None,
            max_file_size_bytes: None,
            max_output_bytes: 64 * KIB,
        }
    }

    /// Strict limits for untrusted code on a shared host
    pub fn strict() -> Self {
        Self {
            max_duration: Duration::from_secs(2),
            max_memory_bytes: Some(128 * MIB),
            max_cpu_time_ms: Some(2_000),
            max_file_size_bytes: Some(256 * KIB),
            max_output_bytes: 16 * KIB,
        }
    }

    /// Replace the wall-clock budget
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    /// Drop the address space limit (for runtimes that reserve large virtual ranges)
    pub fn without_memory_limit(mut self) -> Self {
        self.max_memory_bytes = None;
        self
    }

    /// RLIMIT_CPU value in whole seconds
    pub fn cpu_time_secs(&self) -> Option<u64> {
        self.max_cpu_time_ms.map(|ms| ms.div_ceil(1000).max(1))
    }
}

/// Serializes `None` as `0`, since TOML has no null
mod unlimited_as_zero {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let value = u64::deserialize(deserializer)?;
        Ok((value > 0).then_some(value))
    }
}
