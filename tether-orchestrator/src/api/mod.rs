//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;
pub mod session;
pub mod task;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Task endpoints (browser)
        .route("/tasks", post(task::submit_task))
        .route("/tasks/{job_id}", get(task::poll_task))
        // Job endpoints (runner)
        .route("/job/list/scheduled", get(job::list_scheduled_jobs))
        .route("/job/execute/{id}", post(job::execute_job))
        .route("/job/{id}", get(job::get_job))
        .route("/job/{id}/output", post(job::append_job_output))
        .route("/job/{id}/complete", post(job::complete_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::state::TEST_RUNNER_TOKEN;

    const CALLER_HEADER: &str = "x-caller-id";

    fn runner_auth() -> String {
        format!("Bearer {}", TEST_RUNNER_TOKEN)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn submit_request(caller: Option<&str>, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/tasks")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(caller) = caller {
            builder = builder.header(CALLER_HEADER, caller);
        }
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder
            .body(Body::from(json!({"parameters": {"q": "hi"}}).to_string()))
            .unwrap()
    }

    fn poll_request(uri: &str, caller: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).header(CALLER_HEADER, caller);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(AppState::for_tests());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_caller_is_unauthorized() {
        let app = create_router(AppState::for_tests());
        let response = app.oneshot(submit_request(None, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, json!({"error": "Unauthorized"}));
    }

    #[tokio::test]
    async fn test_poll_without_signature_is_forbidden() {
        let app = create_router(AppState::for_tests());
        let uri = format!("/tasks/{}?cursor=0", uuid::Uuid::new_v4());
        let response = app
            .oneshot(poll_request(&uri, "user-1", Some("task_sid=abc")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Forbidden", "cause": "missing_cursor_sig"})
        );
    }

    #[tokio::test]
    async fn test_submit_mints_session_cookie_once() {
        let app = create_router(AppState::for_tests());

        let response = app.clone().oneshot(submit_request(Some("user-1"), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("task_sid="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));

        let response = app
            .oneshot(submit_request(Some("user-1"), Some("task_sid=existing")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_submit_and_poll_flow() {
        let state = AppState::for_tests();
        let app = create_router(state.clone());
        let cookie = "theme=dark; task_sid=session-a";

        let response = app
            .clone()
            .oneshot(submit_request(Some("user-1"), Some(cookie)))
            .await
            .unwrap();
        let accepted = body_json(response).await;
        let job_id = accepted["jobId"].as_str().unwrap().to_string();
        let sig = accepted["cursorSig"].as_str().unwrap().to_string();
        assert_eq!(accepted["cursor"], 0);

        // Runner claims the job and streams two chunks
        let claim = Request::builder()
            .method("POST")
            .uri(format!("/job/execute/{}", job_id))
            .header(header::AUTHORIZATION, runner_auth())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"runner_id": "runner-1"}).to_string()))
            .unwrap();
        let response = app.clone().oneshot(claim).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["parameters"]["q"], "hi");

        let output = Request::builder()
            .method("POST")
            .uri(format!("/job/{}/output", job_id))
            .header(header::AUTHORIZATION, runner_auth())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!([
                    {"type": "reasoning-delta", "delta": "thinking"},
                    {"type": "text-delta", "delta": "Hello"}
                ])
                .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(output).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["output_len"], 2);

        let uri = format!("/tasks/{}?cursor=0&cursor_sig={}", job_id, sig);
        let response = app
            .clone()
            .oneshot(poll_request(&uri, "user-1", Some(cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let polled = body_json(response).await;
        assert_eq!(polled["nextCursor"], 2);
        assert_eq!(polled["status"], "Running");
        assert_eq!(polled["incrementalPayload"]["text"], "Hello");
        assert_eq!(polled["incrementalPayload"]["reasoningText"], "thinking");

        // Same request again: the token was spent
        let response = app
            .clone()
            .oneshot(poll_request(&uri, "user-1", Some(cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["cause"], "stale_cursor_state");

        // Another caller presenting the fresh token is refused
        let next_sig = polled["nextCursorSig"].as_str().unwrap();
        let uri = format!("/tasks/{}?cursor=2&cursor_sig={}", job_id, next_sig);
        let response = app
            .oneshot(poll_request(&uri, "user-2", Some(cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["cause"], "task_owner_mismatch");
    }

    #[tokio::test]
    async fn test_complete_with_invalid_status_is_bad_request() {
        let app = create_router(AppState::for_tests());
        let request = Request::builder()
            .method("POST")
            .uri(format!("/job/{}/complete", uuid::Uuid::new_v4()))
            .header(header::AUTHORIZATION, runner_auth())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"status": "Running", "result": null}).to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = create_router(AppState::for_tests());
        let request = Request::builder()
            .uri(format!("/job/{}", uuid::Uuid::new_v4()))
            .header(header::AUTHORIZATION, runner_auth())
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_job_routes_require_runner_token() {
        let state = AppState::for_tests();
        let app = create_router(state.clone());
        let cookie = "task_sid=session-a";

        let response = app
            .clone()
            .oneshot(submit_request(Some("user-1"), Some(cookie)))
            .await
            .unwrap();
        let job_id = body_json(response).await["jobId"]
            .as_str()
            .unwrap()
            .to_string();

        let append = |auth: Option<String>| {
            let mut builder = Request::builder()
                .method("POST")
                .uri(format!("/job/{}/output", job_id))
                .header(header::CONTENT_TYPE, "application/json");
            if let Some(auth) = auth {
                builder = builder.header(header::AUTHORIZATION, auth);
            }
            builder
                .body(Body::from(
                    json!([{"type": "text-delta", "delta": "spoofed"}]).to_string(),
                ))
                .unwrap()
        };

        for auth in [None, Some("Bearer wrong-token".to_string()), Some(TEST_RUNNER_TOKEN.to_string())] {
            let response = app.clone().oneshot(append(auth)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        // The browser's own credentials do not open the runner routes either
        let read = Request::builder()
            .uri(format!("/job/{}", job_id))
            .header(CALLER_HEADER, "user-1")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(read).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let list = Request::builder()
            .uri("/job/list/scheduled")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(list).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let id = uuid::Uuid::parse_str(&job_id).unwrap();
        let slice = state.stores.jobs.read_output(id, 0, 10).await.unwrap();
        assert!(slice.units.is_empty());

        let response = app.oneshot(append(Some(runner_auth()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_runner_routes_closed_without_configured_token() {
        let mut state = AppState::for_tests();
        let mut config = (*state.config).clone();
        config.runner_token = None;
        state.config = std::sync::Arc::new(config);
        let app = create_router(state);

        let request = Request::builder()
            .uri("/job/list/scheduled")
            .header(header::AUTHORIZATION, runner_auth())
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
