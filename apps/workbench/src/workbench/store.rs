//! Artifact store — the observable UI state fed by parser events and
//! dispatch outcomes.
//!
//! Artifacts are keyed by their id. When a later message re-opens an id, the
//! artifact starts a new revision: its action list is cleared and outcomes
//! that still arrive for the previous revision are ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::dispatch::{ActionOutcome, ActionStatus, OutcomeListener};
use crate::models::{Action, ActionType};
use crate::parser::events::{ActionEvent, ArtifactEvent, ParserObserver};

#[derive(Debug, Clone, Serialize)]
pub struct ActionEntry {
    pub action_id: usize,
    pub action: Action,
    pub status: ActionStatus,
    /// True once the close tag was parsed and the content is final.
    pub closed: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    pub id: String,
    pub title: String,
    pub message_id: String,
    pub revision: u32,
    pub closed: bool,
    pub actions: Vec<ActionEntry>,
    pub updated_at: DateTime<Utc>,
}

impl ArtifactEntry {
    /// A preview can be shown once the artifact is closed and every action
    /// has completed.
    pub fn preview_ready(&self) -> bool {
        self.closed
            && self
                .actions
                .iter()
                .all(|a| a.status == ActionStatus::Complete)
    }

    pub fn has_failures(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a.status, ActionStatus::Failed | ActionStatus::Aborted))
    }

    fn action_mut(&mut self, action_id: usize) -> Option<&mut ActionEntry> {
        self.actions.iter_mut().find(|a| a.action_id == action_id)
    }
}

/// Final file contents of a closed artifact, handed to persistence as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSnapshot {
    pub id: String,
    pub title: String,
    pub revision: u32,
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: RwLock<Vec<ArtifactEntry>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<ArtifactEntry> {
        self.artifacts.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<ArtifactEntry> {
        self.artifacts.read().iter().find(|a| a.id == id).cloned()
    }

    /// Last written content per path; `None` while the artifact is open.
    pub fn snapshot(&self, id: &str) -> Option<ArtifactSnapshot> {
        let artifacts = self.artifacts.read();
        let artifact = artifacts.iter().find(|a| a.id == id && a.closed)?;

        let files = artifact
            .actions
            .iter()
            .filter(|a| a.closed && a.action.action_type == ActionType::File)
            .filter_map(|a| {
                let path = a.action.file_path.clone()?;
                Some((path, a.action.content.clone()))
            })
            .collect();

        Some(ArtifactSnapshot {
            id: artifact.id.clone(),
            title: artifact.title.clone(),
            revision: artifact.revision,
            files,
        })
    }

    pub fn clear(&self) {
        self.artifacts.write().clear();
    }

    fn upsert_action(&self, event: &ActionEvent, closed: bool) {
        let mut artifacts = self.artifacts.write();
        let Some(artifact) = artifacts
            .iter_mut()
            .find(|a| a.id == event.artifact_id && a.message_id == event.message_id)
        else {
            debug!("Action for unknown artifact '{}' ignored", event.artifact_id);
            return;
        };

        let now = Utc::now();
        artifact.updated_at = now;
        match artifact.action_mut(event.action_id) {
            Some(entry) => {
                entry.action = event.action.clone();
                entry.closed = closed;
                entry.updated_at = now;
            }
            None => artifact.actions.push(ActionEntry {
                action_id: event.action_id,
                action: event.action.clone(),
                status: ActionStatus::Pending,
                closed,
                output: None,
                error: None,
                updated_at: now,
            }),
        }
    }
}

impl ParserObserver for ArtifactStore {
    fn on_artifact_open(&self, event: &ArtifactEvent) {
        let mut artifacts = self.artifacts.write();
        let now = Utc::now();

        match artifacts.iter_mut().find(|a| a.id == event.artifact.id) {
            Some(existing) => {
                existing.revision += 1;
                existing.title = event.artifact.title.clone();
                existing.message_id = event.message_id.clone();
                existing.closed = false;
                existing.actions.clear();
                existing.updated_at = now;
                info!(
                    "Artifact '{}' revised (revision {})",
                    existing.id, existing.revision
                );
            }
            None => artifacts.push(ArtifactEntry {
                id: event.artifact.id.clone(),
                title: event.artifact.title.clone(),
                message_id: event.message_id.clone(),
                revision: 1,
                closed: false,
                actions: Vec::new(),
                updated_at: now,
            }),
        }
    }

    fn on_artifact_close(&self, event: &ArtifactEvent) {
        let mut artifacts = self.artifacts.write();
        if let Some(artifact) = artifacts
            .iter_mut()
            .find(|a| a.id == event.artifact.id && a.message_id == event.message_id)
        {
            artifact.closed = true;
            artifact.updated_at = Utc::now();
        }
    }

    fn on_action_open(&self, event: &ActionEvent) {
        self.upsert_action(event, false);
    }

    fn on_action_close(&self, event: &ActionEvent) {
        self.upsert_action(event, true);
    }
}

impl OutcomeListener for ArtifactStore {
    fn on_outcome(&self, outcome: &ActionOutcome) {
        let mut artifacts = self.artifacts.write();
        let Some(artifact) = artifacts
            .iter_mut()
            .find(|a| a.id == outcome.artifact_id && a.message_id == outcome.message_id)
        else {
            debug!(
                "Outcome for stale revision of '{}' ignored",
                outcome.artifact_id
            );
            return;
        };

        artifact.updated_at = outcome.at;
        if outcome.status.is_final() {
            debug!(
                "Action {} of '{}' finished: {:?}",
                outcome.action_id, outcome.artifact_id, outcome.status
            );
        }
        if let Some(entry) = artifact.action_mut(outcome.action_id) {
            entry.status = outcome.status;
            entry.output = outcome.output.clone();
            entry.error = outcome.error.clone();
            entry.updated_at = outcome.at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArtifactMeta;
    use crate::parser::{ParserEvent, StreamParser};
    use std::sync::Arc;

    fn parse_into_store(store: &Arc<ArtifactStore>, message_id: &str, text: &str) {
        let mut parser = StreamParser::default();
        parser.subscribe(store.clone());
        parser.parse(message_id, text);
    }

    fn outcome(message_id: &str, action_id: usize, status: ActionStatus) -> ActionOutcome {
        ActionOutcome {
            message_id: message_id.to_string(),
            artifact_id: "site".to_string(),
            action_id,
            action_type: ActionType::Shell,
            status,
            output: Some("done".to_string()),
            error: None,
            at: Utc::now(),
        }
    }

    const SITE: &str = "<folioArtifact id=\"site\" title=\"Site\"><folioAction type=\"file\" filePath=\"index.html\">v1</folioAction><folioAction type=\"shell\">npm i</folioAction><folioAction type=\"file\" filePath=\"index.html\">v2</folioAction></folioArtifact>";

    #[test]
    fn test_store_tracks_actions_in_parse_order() {
        let store = Arc::new(ArtifactStore::new());
        parse_into_store(&store, "m1", SITE);

        let artifact = store.get("site").unwrap();
        assert!(artifact.closed);
        assert_eq!(artifact.revision, 1);
        let ids: Vec<_> = artifact.actions.iter().map(|a| a.action_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(artifact.actions.iter().all(|a| a.closed));
        assert!(artifact.actions.iter().all(|a| a.status == ActionStatus::Pending));
    }

    #[test]
    fn test_file_action_is_visible_before_close() {
        let store = Arc::new(ArtifactStore::new());
        parse_into_store(
            &store,
            "m1",
            "<folioArtifact id=\"site\" title=\"Site\"><folioAction type=\"file\" filePath=\"a.css\">body {",
        );

        let artifact = store.get("site").unwrap();
        assert_eq!(artifact.actions.len(), 1);
        assert!(!artifact.actions[0].closed);
        assert!(store.snapshot("site").is_none());
    }

    #[test]
    fn test_snapshot_keeps_last_write_per_path() {
        let store = Arc::new(ArtifactStore::new());
        parse_into_store(&store, "m1", SITE);

        let snapshot = store.snapshot("site").unwrap();
        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.files["index.html"], "v2");
    }

    #[test]
    fn test_outcomes_update_status_and_preview() {
        let store = Arc::new(ArtifactStore::new());
        parse_into_store(&store, "m1", SITE);

        for id in 0..3 {
            store.on_outcome(&outcome("m1", id, ActionStatus::Complete));
        }
        let artifact = store.get("site").unwrap();
        assert!(artifact.preview_ready());
        assert_eq!(artifact.actions[1].output.as_deref(), Some("done"));
    }

    #[test]
    fn test_failed_action_blocks_preview() {
        let store = Arc::new(ArtifactStore::new());
        parse_into_store(&store, "m1", SITE);

        store.on_outcome(&outcome("m1", 0, ActionStatus::Complete));
        store.on_outcome(&outcome("m1", 1, ActionStatus::Failed));
        store.on_outcome(&outcome("m1", 2, ActionStatus::Aborted));

        let artifact = store.get("site").unwrap();
        assert!(!artifact.preview_ready());
        assert!(artifact.has_failures());
    }

    #[test]
    fn test_reopened_id_starts_new_revision() {
        let store = Arc::new(ArtifactStore::new());
        parse_into_store(&store, "m1", SITE);
        parse_into_store(
            &store,
            "m2",
            "<folioArtifact id=\"site\" title=\"Site v2\"><folioAction type=\"shell\">npm test</folioAction>",
        );

        // Late outcome from the first revision must not leak into the new one.
        store.on_outcome(&outcome("m1", 0, ActionStatus::Failed));

        let artifact = store.get("site").unwrap();
        assert_eq!(artifact.revision, 2);
        assert_eq!(artifact.title, "Site v2");
        assert_eq!(artifact.message_id, "m2");
        assert!(!artifact.closed);
        assert_eq!(artifact.actions.len(), 1);
        assert_eq!(artifact.actions[0].status, ActionStatus::Pending);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_notify_routes_events() {
        let store = ArtifactStore::new();
        store.notify(&ParserEvent::ArtifactOpened(ArtifactEvent {
            message_id: "m".to_string(),
            artifact: ArtifactMeta {
                id: "a".to_string(),
                title: "A".to_string(),
            },
        }));
        assert!(store.get("a").is_some());

        store.clear();
        assert!(store.list().is_empty());
    }
}
