//! Per-execution temporary workspace
//!
//! Every execution gets a private directory under the shared scratch area.
//! The directory name carries a uuid token plus a random suffix, so concurrent
//! executions never share paths and need no locking. The workspace is removed
//! when `release` is called or when the value is dropped, whichever happens first.

use crate::error::Result;
use crate::language::{Language, RunnerKind};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

const WORKSPACE_PREFIX: &str = "polyexec-";

/// Isolated filesystem area for one execution
#[derive(Debug)]
pub struct TempWorkspace {
    dir: Option<TempDir>,
    root_dir: PathBuf,
    source_file: PathBuf,
    input_file: PathBuf,
    artifact_file: Option<PathBuf>,
}

impl TempWorkspace {
    /// Create a fresh workspace for `language` under `scratch_dir`
    pub fn acquire(scratch_dir: &Path, language: Language) -> Result<Self> {
        std::fs::create_dir_all(scratch_dir)?;

        let token = Uuid::new_v4().simple().to_string();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}{}-", WORKSPACE_PREFIX, token))
            .tempdir_in(scratch_dir)?;
        let root_dir = dir.path().to_path_buf();

        let artifact_file = match language.kind() {
            RunnerKind::Compiled => Some(root_dir.join("main.bin")),
            RunnerKind::Interpreted => None,
        };

        tracing::debug!(workspace = %root_dir.display(), %language, "Acquired workspace");

        Ok(Self {
            source_file: root_dir.join(format!("main.{}", language.extension())),
            input_file: root_dir.join("input.txt"),
            artifact_file,
            root_dir,
            dir: Some(dir),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    /// Path the compiler must produce; `None` for interpreted languages
    pub fn artifact_file(&self) -> Option<&Path> {
        self.artifact_file.as_deref()
    }

    /// Whether the compiler left an artifact behind
    pub async fn artifact_exists(&self) -> bool {
        match &self.artifact_file {
            Some(path) => tokio::fs::metadata(path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false),
            None => false,
        }
    }

    pub async fn write_source(&self, code: &str) -> Result<()> {
        tokio::fs::write(&self.source_file, code).await?;
        Ok(())
    }

    pub async fn write_input(&self, stdin: &str) -> Result<()> {
        tokio::fs::write(&self.input_file, stdin).await?;
        Ok(())
    }

    /// Whether `release` has already run
    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Delete the workspace and everything in it. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        match dir.close() {
            Ok(()) => {
                tracing::debug!(workspace = %self.root_dir.display(), "Released workspace");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                // The program may have revoked its own write access on directories
                // it created; take it back before retrying.
                tracing::debug!(
                    workspace = %self.root_dir.display(),
                    "Workspace removal failed, restoring permissions: {}",
                    e
                );
                if let Err(chmod) = restore_owner_access(&self.root_dir) {
                    tracing::debug!(
                        workspace = %self.root_dir.display(),
                        "Failed to restore permissions: {}",
                        chmod
                    );
                }
                match std::fs::remove_dir_all(&self.root_dir) {
                    Ok(()) => {
                        tracing::debug!(workspace = %self.root_dir.display(), "Released workspace");
                        Ok(())
                    }
                    Err(retry) if retry.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(retry) => Err(retry.into()),
                }
            }
        }
    }
}

/// Give the owner rwx on `root` and every directory below it.
///
/// Iterative, since the tree depth is chosen by the program. Symlinks are not followed.
fn restore_owner_access(root: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                pending.push(entry.path());
            }
        }
    }
    Ok(())
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(
                workspace = %self.root_dir.display(),
                "Failed to remove workspace: {}",
                e
            );
        }
    }
}
