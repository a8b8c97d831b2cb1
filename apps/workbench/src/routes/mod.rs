pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::parser::handlers as parser_handlers;
use crate::state::AppState;
use crate::workbench::handlers as workbench_handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Message parsing
        .route(
            "/api/v1/messages/:message_id/parse",
            post(parser_handlers::handle_parse),
        )
        .route(
            "/api/v1/messages/:message_id/finish",
            post(parser_handlers::handle_finish),
        )
        .route(
            "/api/v1/messages/:message_id",
            delete(parser_handlers::handle_forget),
        )
        .route("/api/v1/parser/reset", post(parser_handlers::handle_reset))
        // Workbench state
        .route(
            "/api/v1/artifacts",
            get(workbench_handlers::handle_list_artifacts),
        )
        .route(
            "/api/v1/artifacts/:artifact_id",
            get(workbench_handlers::handle_get_artifact),
        )
        .route(
            "/api/v1/artifacts/:artifact_id/snapshot",
            get(workbench_handlers::handle_get_snapshot),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::dispatch::MemorySandbox;

    const MESSAGE: &str = "Here you go.\n<folioArtifact id=\"portfolio\" title=\"Portfolio\">\n<folioAction type=\"file\" filePath=\"index.html\">\n<h1>Ada</h1>\n</folioAction>\n<folioAction type=\"shell\">\nnpm install\n</folioAction>\n</folioArtifact>\nDone.";

    fn app() -> (Router, AppState, Arc<MemorySandbox>) {
        let sandbox = Arc::new(MemorySandbox::new());
        let state = AppState::with_sandbox(Config::default(), sandbox.clone()).unwrap();
        (build_router(state.clone()), state, sandbox)
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_for_preview(router: &Router) -> Value {
        for _ in 0..100 {
            let (_, artifact) = call(router, "GET", "/api/v1/artifacts/portfolio", None).await;
            if artifact["preview_ready"] == json!(true) {
                return artifact;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("artifact never became ready");
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _, _) = app();
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sandbox"], "memory");
        assert_eq!(body["tags"]["artifact"], "folioArtifact");
    }

    #[tokio::test]
    async fn test_streamed_message_is_parsed_and_dispatched() {
        let (router, _, sandbox) = app();
        let split = MESSAGE.find("<h1>").unwrap() + 2;

        let (status, first) = call(
            &router,
            "POST",
            "/api/v1/messages/m1/parse",
            Some(json!({ "text": &MESSAGE[..split] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["display"], "Here you go.\n");
        assert_eq!(first["events"][0]["kind"], "artifact_opened");
        assert_eq!(first["events"][1]["kind"], "action_opened");

        let (_, second) = call(
            &router,
            "POST",
            "/api/v1/messages/m1/parse",
            Some(json!({ "text": MESSAGE })),
        )
        .await;
        assert_eq!(second["display"], "Here you go.\n\nDone.");
        assert_eq!(second["events"].as_array().unwrap().len(), 3);

        let artifact = wait_for_preview(&router).await;
        assert_eq!(artifact["actions"][1]["status"], "complete");
        assert_eq!(
            sandbox.file("index.html").as_deref(),
            Some("<h1>Ada</h1>\n")
        );

        let (status, snapshot) =
            call(&router, "GET", "/api/v1/artifacts/portfolio/snapshot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["files"]["index.html"], "<h1>Ada</h1>\n");
    }

    #[tokio::test]
    async fn test_unknown_artifact_is_404() {
        let (router, _, _) = app();
        let (status, body) = call(&router, "GET", "/api/v1/artifacts/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let (router, state, _) = app();
        call(
            &router,
            "POST",
            "/api/v1/messages/m1/parse",
            Some(json!({ "text": MESSAGE })),
        )
        .await;

        let (status, body) = call(&router, "POST", "/api/v1/parser/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cleared_messages"], 1);
        assert_eq!(state.parser.lock().message_count(), 0);
        assert_eq!(state.dispatcher.queue_count(), 0);
    }

    #[tokio::test]
    async fn test_forget_unknown_message_is_404() {
        let (router, _, _) = app();
        let (status, _) = call(&router, "DELETE", "/api/v1/messages/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_finish_releases_trailing_text() {
        let (router, _, _) = app();
        let (_, body) = call(
            &router,
            "POST",
            "/api/v1/messages/m9/finish",
            Some(json!({ "text": "x < y and <fol" })),
        )
        .await;
        assert_eq!(body["display"], "x < y and <fol");
    }
}
