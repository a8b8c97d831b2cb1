//! Sandbox adapter — the only place where actions touch a filesystem or a shell.
//!
//! `Sandbox` is carried as `Arc<dyn Sandbox>` so the dispatcher does not care
//! whether it writes to a real directory or to memory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path escapes the sandbox root: {0}")]
    PathEscape(String),

    #[error("Sandbox unavailable: {0}")]
    Unavailable(String),
}

/// Result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Merged stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Overwrites `path` with `content`, creating parent directories.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError>;

    /// Runs `command` to completion. A non-zero exit is not an `Err`.
    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError>;
}

/// Resolves a generator-supplied relative path below `root`.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::PathEscape(relative.to_string()));
            }
        }
    }

    if depth == 0 {
        return Err(SandboxError::PathEscape(relative.to_string()));
    }
    Ok(resolved)
}

/// Directory-backed sandbox running commands through a shell.
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    root: PathBuf,
    shell: String,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>, shell: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            shell: shell.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let target = resolve_within(&self.root, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;
        debug!("Wrote {} bytes to {}", content.len(), target.display());
        Ok(())
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| SandboxError::Unavailable(format!("failed to spawn {}: {e}", self.shell)))?;

        let mut merged = String::from_utf8_lossy(&output.stdout).into_owned();
        merged.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            // Killed by a signal: no exit code.
            exit_code: output.status.code().unwrap_or(-1),
            output: merged,
        })
    }
}
