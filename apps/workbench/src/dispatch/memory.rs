use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::dispatch::sandbox::{resolve_within, CommandOutput, Sandbox, SandboxError};

/// One side effect observed by a `MemorySandbox`, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SandboxOp {
    Write { path: String, content: String },
    Run { command: String },
}

/// In-memory sandbox: keeps files in a map and journals every operation.
/// Commands succeed unless they start with a configured failing prefix.
#[derive(Debug, Default)]
pub struct MemorySandbox {
    files: Mutex<BTreeMap<String, String>>,
    journal: Mutex<Vec<SandboxOp>>,
    failing_prefixes: Vec<String>,
}

impl MemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` exit with status 1.
    pub fn failing_on(mut self, prefix: impl Into<String>) -> Self {
        self.failing_prefixes.push(prefix.into());
        self
    }

    #[cfg(test)]
    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().get(path).cloned()
    }

    #[cfg(test)]
    pub fn files(&self) -> BTreeMap<String, String> {
        self.files.lock().clone()
    }

    #[cfg(test)]
    pub fn journal(&self) -> Vec<SandboxOp> {
        self.journal.lock().clone()
    }
}

#[async_trait]
impl Sandbox for MemorySandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        // Same path rules as the local sandbox.
        resolve_within(Path::new("/"), path)?;
        self.files
            .lock()
            .insert(path.to_string(), content.to_string());
        self.journal.lock().push(SandboxOp::Write {
            path: path.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn run_command(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        self.journal.lock().push(SandboxOp::Run {
            command: command.to_string(),
        });
        let trimmed = command.trim_start();
        let fails = self
            .failing_prefixes
            .iter()
            .any(|prefix| trimmed.starts_with(prefix.as_str()));

        Ok(if fails {
            CommandOutput {
                exit_code: 1,
                output: format!("{}: command failed\n", trimmed.trim_end()),
            }
        } else {
            CommandOutput {
                exit_code: 0,
                output: String::new(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sandbox_overwrites_and_journals() {
        let sandbox = MemorySandbox::new();
        sandbox.write_file("a.txt", "1").await.unwrap();
        sandbox.run_command("ls").await.unwrap();
        sandbox.write_file("a.txt", "2").await.unwrap();

        assert_eq!(sandbox.file("a.txt").as_deref(), Some("2"));
        assert_eq!(sandbox.journal().len(), 3);
    }

    #[tokio::test]
    async fn test_memory_sandbox_failing_prefix() {
        let sandbox = MemorySandbox::new().failing_on("npm test");
        assert!(sandbox.run_command("npm install\n").await.unwrap().success());
        assert_eq!(sandbox.run_command("npm test\n").await.unwrap().exit_code, 1);
    }

    #[tokio::test]
    async fn test_memory_sandbox_rejects_escaping_paths() {
        let sandbox = MemorySandbox::new();
        assert!(sandbox.write_file("../x", "").await.is_err());
        assert!(sandbox.journal().is_empty());
    }
}
