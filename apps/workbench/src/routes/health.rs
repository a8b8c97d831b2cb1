use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and the active
/// protocol tags.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let (artifact_tag, action_tag) = {
        let parser = state.parser.lock();
        let tags = parser.tags();
        (tags.artifact().to_string(), tags.action().to_string())
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "workbench",
        "sandbox": state.config.sandbox_mode,
        "tags": {
            "artifact": artifact_tag,
            "action": action_tag,
        }
    }))
}
