use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::errors::AppError;
use crate::state::AppState;
use crate::workbench::{ArtifactEntry, ArtifactSnapshot};

#[derive(Serialize)]
pub struct ArtifactView {
    #[serde(flatten)]
    pub artifact: ArtifactEntry,
    pub preview_ready: bool,
    pub has_failures: bool,
}

impl From<ArtifactEntry> for ArtifactView {
    fn from(artifact: ArtifactEntry) -> Self {
        Self {
            preview_ready: artifact.preview_ready(),
            has_failures: artifact.has_failures(),
            artifact,
        }
    }
}

#[derive(Serialize)]
pub struct ArtifactListResponse {
    pub artifacts: Vec<ArtifactView>,
}

/// GET /api/v1/artifacts
pub async fn handle_list_artifacts(State(state): State<AppState>) -> Json<ArtifactListResponse> {
    let artifacts = state
        .store
        .list()
        .into_iter()
        .map(ArtifactView::from)
        .collect();
    Json(ArtifactListResponse { artifacts })
}

/// GET /api/v1/artifacts/:artifact_id
pub async fn handle_get_artifact(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<Json<ArtifactView>, AppError> {
    state
        .store
        .get(&artifact_id)
        .map(|artifact| Json(artifact.into()))
        .ok_or_else(|| AppError::NotFound(format!("Artifact {artifact_id} not found")))
}

/// GET /api/v1/artifacts/:artifact_id/snapshot
///
/// Final file contents; only available once the artifact has closed.
pub async fn handle_get_snapshot(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<Json<ArtifactSnapshot>, AppError> {
    state.store.snapshot(&artifact_id).map(Json).ok_or_else(|| {
        AppError::NotFound(format!("No closed artifact {artifact_id}"))
    })
}
