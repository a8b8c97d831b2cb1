use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::info;

use crate::config::{Config, SandboxMode};
use crate::dispatch::{ActionDispatcher, LocalSandbox, MemorySandbox, Sandbox};
use crate::parser::StreamParser;
use crate::workbench::ArtifactStore;

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Wiring: the parser notifies the store first and the dispatcher second, so
/// an action is known to the store before any outcome for it can arrive.
#[derive(Clone)]
pub struct AppState {
    /// Parse calls are serialized; the parser itself never awaits.
    pub parser: Arc<Mutex<StreamParser>>,
    pub store: Arc<ArtifactStore>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub config: Config,
}

impl AppState {
    /// Must be called from within the Tokio runtime.
    pub fn build(config: Config) -> Result<Self> {
        let sandbox: Arc<dyn Sandbox> = match config.sandbox_mode {
            SandboxMode::Local => {
                std::fs::create_dir_all(&config.sandbox_root).with_context(|| {
                    format!("cannot create sandbox root {}", config.sandbox_root.display())
                })?;
                let local =
                    LocalSandbox::new(config.sandbox_root.clone(), config.sandbox_shell.clone());
                info!("Local sandbox at {}", local.root().display());
                Arc::new(local)
            }
            SandboxMode::Memory => {
                info!("In-memory sandbox (dry run)");
                Arc::new(MemorySandbox::new())
            }
        };
        Self::with_sandbox(config, sandbox)
    }

    pub fn with_sandbox(config: Config, sandbox: Arc<dyn Sandbox>) -> Result<Self> {
        let store = Arc::new(ArtifactStore::new());
        let dispatcher = Arc::new(ActionDispatcher::new(sandbox).with_listener(store.clone()));

        let mut parser = StreamParser::new(config.tag_names()?);
        parser.subscribe(store.clone());
        parser.subscribe(dispatcher.clone());

        Ok(Self {
            parser: Arc::new(Mutex::new(parser)),
            store,
            dispatcher,
            config,
        })
    }
}
