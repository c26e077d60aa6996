pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::chat::handlers as chat;
use crate::context::handlers as context;
use crate::context::validation::MAX_UPLOAD_BYTES;
use crate::render::handlers as render;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Context
        .route(
            "/api/v1/context/refresh",
            post(context::handle_refresh_context),
        )
        .route(
            "/api/v1/profile/:id",
            get(context::handle_get_profile).put(context::handle_update_profile),
        )
        .route("/api/v1/resumes", post(context::handle_upload_resume))
        // Chat
        .route("/api/v1/chat", get(chat::handle_get_chat))
        .route("/api/v1/chat/messages", post(chat::handle_send_message))
        // Rendering
        .route("/api/v1/render", post(render::handle_render))
        // Multipart framing on top of the largest accepted file.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES * 2))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::chat::engine::AssistantEngine;
    use crate::context::assembler::ContextAssembler;
    use crate::context::prompts::{GREETING_NOTICE, LOADED_NOTICE};
    use crate::testing::{FakeStore, ScriptStep, ScriptedBackend};

    const BOUNDARY: &str = "portfolio-test-boundary";
    const ADMIN_TOKEN: &str = "test-admin-token";

    struct Harness {
        store: Arc<FakeStore>,
        state: AppState,
    }

    fn harness(store: FakeStore, script: Vec<ScriptStep>) -> Harness {
        let store = Arc::new(store);
        let backend = Arc::new(ScriptedBackend::new(script));
        let state = AppState {
            store: store.clone(),
            assembler: Arc::new(ContextAssembler::new(store.clone())),
            engine: Arc::new(AssistantEngine::new(backend)),
            admin_token: Arc::from(ADMIN_TOKEN),
        };
        Harness { store, state }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, String) {
        let response = build_router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn with_token(mut request: Request<Body>, token: &str) -> Request<Body> {
        request.headers_mut().insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        request
    }

    fn admin(request: Request<Body>) -> Request<Body> {
        with_token(request, ADMIN_TOKEN)
    }

    fn upload_request(content_type: &str, content: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"resume\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/v1/resumes")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(FakeStore::default(), vec![]);
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&h.state, request).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["service"], "portfolio-api");
    }

    #[tokio::test]
    async fn test_chat_snapshot_renders_assistant_messages() {
        let h = harness(FakeStore::default(), vec![]);
        let request = Request::get("/api/v1/chat").body(Body::empty()).unwrap();
        let (status, body) = send(&h.state, request).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["messages"][0]["content"], GREETING_NOTICE);
        assert_eq!(body["messages"][0]["nodes"][0]["type"], "paragraph");
        assert_eq!(body["thinking"], false);
    }

    #[tokio::test]
    async fn test_refresh_reports_loaded_context() {
        let h = harness(FakeStore::with_resume("resume_1.txt", "Jane Doe"), vec![]);
        let request = Request::post("/api/v1/context/refresh")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&h.state, request).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "loaded");
        assert_eq!(body["message"], LOADED_NOTICE);
        assert_eq!(body["session_ready"], true);
    }

    #[tokio::test]
    async fn test_send_message_streams_sse() {
        let h = harness(
            FakeStore::with_resume("resume_1.txt", "Jane Doe"),
            vec![ScriptStep::Text("Hello"), ScriptStep::Text(" there")],
        );
        h.state.engine.refresh_context(&h.state.assembler).await;

        let request = json_request("POST", "/api/v1/chat/messages", json!({"message": "Hi"}));
        let (status, body) = send(&h.state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("event: done"));
        assert!(body.contains(r#"{"content":"Hello there"}"#));
        assert!(!h.state.engine.snapshot().thinking);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let h = harness(FakeStore::default(), vec![]);
        let request = json_request("POST", "/api/v1/chat/messages", json!({"message": "  "}));
        let (status, body) = send(&h.state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_message_while_thinking_is_conflict() {
        let h = harness(FakeStore::default(), vec![]);
        let _pending = h.state.engine.begin_turn("first").await.unwrap();

        let request = json_request("POST", "/api/v1/chat/messages", json!({"message": "second"}));
        let (status, _) = send(&h.state, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_render_endpoint() {
        let h = harness(FakeStore::default(), vec![]);
        let request = json_request("POST", "/api/v1/render", json!({"content": "# Hi\n* a"}));
        let (_, body) = send(&h.state, request).await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["nodes"][0]["level"], 1);
        assert_eq!(body["nodes"][1]["type"], "bullet_list");
    }

    #[tokio::test]
    async fn test_profile_rejects_invalid_github_url() {
        let h = harness(FakeStore::default(), vec![]);
        let uri = format!("/api/v1/profile/{}", Uuid::new_v4());
        let request = admin(json_request(
            "PUT",
            &uri,
            json!({"linkedin_about": "About", "github_url": "https://gitlab.com/jane"}),
        ));
        let (status, _) = send(&h.state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_profile_upsert_then_read() {
        let h = harness(FakeStore::default(), vec![]);
        let uri = format!("/api/v1/profile/{}", Uuid::new_v4());

        let request = Request::get(uri.as_str()).body(Body::empty()).unwrap();
        assert_eq!(send(&h.state, request).await.0, StatusCode::NOT_FOUND);

        let request = admin(json_request(
            "PUT",
            &uri,
            json!({"linkedin_about": "About", "github_url": " https://github.com/jane "}),
        ));
        assert_eq!(send(&h.state, request).await.0, StatusCode::OK);

        let request = Request::get(uri.as_str()).body(Body::empty()).unwrap();
        let (_, body) = send(&h.state, request).await;
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["github_url"], "https://github.com/jane");
    }

    #[tokio::test]
    async fn test_upload_rejects_disallowed_type_before_store() {
        let h = harness(FakeStore::default(), vec![]);
        let (status, _) = send(&h.state, admin(upload_request("image/png", b"png"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(h.store.activated().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_file() {
        let h = harness(FakeStore::default(), vec![]);
        let content = vec![b'a'; MAX_UPLOAD_BYTES + 1];
        let (status, body) = send(&h.state, admin(upload_request("text/plain", &content))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("File is too large"));
        assert!(h.store.activated().is_empty());
    }

    #[tokio::test]
    async fn test_upload_activates_resume_and_refreshes_context() {
        let h = harness(FakeStore::default(), vec![]);
        let (status, body) =
            send(&h.state, admin(upload_request("text/plain", b"Jane Doe, engineer"))).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["context"]["status"], "loaded");

        let activated = h.store.activated();
        assert_eq!(activated.len(), 1);
        assert!(activated[0].starts_with("resume_") && activated[0].ends_with(".txt"));
        assert!(h.store.has_file(&activated[0]));
    }

    #[tokio::test]
    async fn test_profile_write_requires_admin_token() {
        let h = harness(FakeStore::default(), vec![]);
        let id = Uuid::new_v4();
        let uri = format!("/api/v1/profile/{id}");
        let body = json!({"linkedin_about": "About", "github_url": "https://github.com/jane"});

        let (status, response) = send(&h.state, json_request("PUT", &uri, body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(response.contains("UNAUTHORIZED"));

        let request = with_token(json_request("PUT", &uri, body), "wrong-token");
        assert_eq!(send(&h.state, request).await.0, StatusCode::UNAUTHORIZED);

        // Nothing was written.
        let request = Request::get(uri.as_str()).body(Body::empty()).unwrap();
        assert_eq!(send(&h.state, request).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_requires_admin_token() {
        let h = harness(FakeStore::default(), vec![]);

        let (status, _) = send(&h.state, upload_request("text/plain", b"Jane Doe")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = with_token(upload_request("text/plain", b"Jane Doe"), "wrong-token");
        assert_eq!(send(&h.state, request).await.0, StatusCode::UNAUTHORIZED);

        assert!(h.store.activated().is_empty());
    }

    #[tokio::test]
    async fn test_public_routes_need_no_token() {
        let h = harness(FakeStore::with_resume("resume_1.txt", "Jane Doe"), vec![]);
        let request = Request::post("/api/v1/context/refresh")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&h.state, request).await.0, StatusCode::OK);

        let request = Request::get("/api/v1/chat").body(Body::empty()).unwrap();
        assert_eq!(send(&h.state, request).await.0, StatusCode::OK);
    }
}
