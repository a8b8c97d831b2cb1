use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::parser::{TagNames, DEFAULT_ACTION_TAG, DEFAULT_ARTIFACT_TAG};

/// Where dispatched actions land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Real directory plus a shell.
    Local,
    /// In-memory dry run; nothing touches disk.
    Memory,
}

impl FromStr for SandboxMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(SandboxMode::Local),
            "memory" => Ok(SandboxMode::Memory),
            other => bail!("SANDBOX_MODE must be 'local' or 'memory', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Every variable has a default; invalid values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub sandbox_mode: SandboxMode,
    pub sandbox_root: PathBuf,
    pub sandbox_shell: String,
    pub artifact_tag: String,
    pub action_tag: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            port: env_or("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: env_or("RUST_LOG", "info"),
            sandbox_mode: env_or("SANDBOX_MODE", "local").parse()?,
            sandbox_root: PathBuf::from(env_or("SANDBOX_ROOT", "./sandbox")),
            sandbox_shell: env_or("SANDBOX_SHELL", "sh"),
            artifact_tag: env_or("ARTIFACT_TAG", DEFAULT_ARTIFACT_TAG),
            action_tag: env_or("ACTION_TAG", DEFAULT_ACTION_TAG),
        };

        // Fail at startup rather than on the first message.
        config.tag_names()?;
        Ok(config)
    }

    pub fn tag_names(&self) -> Result<TagNames> {
        TagNames::new(&self.artifact_tag, &self.action_tag)
            .context("ARTIFACT_TAG / ACTION_TAG are not usable tag names")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            rust_log: "info".to_string(),
            sandbox_mode: SandboxMode::Memory,
            sandbox_root: PathBuf::from("./sandbox"),
            sandbox_shell: "sh".to_string(),
            artifact_tag: DEFAULT_ARTIFACT_TAG.to_string(),
            action_tag: DEFAULT_ACTION_TAG.to_string(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
