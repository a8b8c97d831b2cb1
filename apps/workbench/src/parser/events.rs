//! Lifecycle events emitted by the stream parser and the observer seam
//! through which the artifact store and the dispatcher subscribe to them.

use serde::Serialize;

use crate::models::{Action, ArtifactMeta};

/// An artifact opened or closed inside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEvent {
    pub message_id: String,
    #[serde(flatten)]
    pub artifact: ArtifactMeta,
}

/// An action opened or closed inside the message's active artifact.
///
/// `ActionOpened` is sent for file actions only and carries the path with
/// empty content; the body is not streamed. The full content arrives once,
/// with `ActionClosed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionEvent {
    pub message_id: String,
    pub artifact_id: String,
    /// Position of the action within its message, starting at 0.
    pub action_id: usize,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParserEvent {
    ArtifactOpened(ArtifactEvent),
    ArtifactClosed(ArtifactEvent),
    ActionOpened(ActionEvent),
    ActionClosed(ActionEvent),
}

/// Subscriber to parser events. Callbacks run synchronously inside
/// `StreamParser::parse`, in parse order, and must not block.
pub trait ParserObserver: Send + Sync {
    fn on_artifact_open(&self, _event: &ArtifactEvent) {}
    fn on_artifact_close(&self, _event: &ArtifactEvent) {}
    fn on_action_open(&self, _event: &ActionEvent) {}
    fn on_action_close(&self, _event: &ActionEvent) {}

    /// Fans a single event out to the typed callbacks.
    fn notify(&self, event: &ParserEvent) {
        match event {
            ParserEvent::ArtifactOpened(e) => self.on_artifact_open(e),
            ParserEvent::ArtifactClosed(e) => self.on_artifact_close(e),
            ParserEvent::ActionOpened(e) => self.on_action_open(e),
            ParserEvent::ActionClosed(e) => self.on_action_close(e),
        }
    }
}
