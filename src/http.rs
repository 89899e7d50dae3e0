//! Read-only status API.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::adapter::ContainerAdapter;
use crate::journal::Journal;

pub const DEFAULT_EVENT_LIMIT: usize = 20;
pub const MAX_EVENT_LIMIT: usize = 1000;

/// State shared across axum handlers.
pub struct StatusState {
    pub journal: Arc<Journal>,
    pub adapter: Arc<dyn ContainerAdapter>,
}

/// Anything that is not a number falls back to the default.
pub fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .map(|limit| limit.clamp(1, MAX_EVENT_LIMIT as i64) as usize)
        .unwrap_or(DEFAULT_EVENT_LIMIT)
}

/// `status`, `/status` and `/status/` all serve on `/status/`.
pub fn route_path(prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        "/".to_string()
    } else {
        format!("/{prefix}/")
    }
}

pub fn create_router(prefix: &str, state: Arc<StatusState>) -> Router {
    Router::new()
        .route(&route_path(prefix), get(status))
        .with_state(state)
}

pub async fn serve(
    address: &str,
    port: u16,
    prefix: &str,
    state: Arc<StatusState>,
) -> std::io::Result<()> {
    let addr = format!("{address}:{port}");
    log::info!("Starting the status server on http://{addr}{}", route_path(prefix));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(prefix, state)).await
}

async fn status(
    State(state): State<Arc<StatusState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = parse_limit(params.get("limit").map(String::as_str));

    let containers = match state.adapter.list_all().await {
        Ok(containers) => containers,
        Err(e) => {
            log::error!("Status request failed to list containers: {e}");
            return error_response(e.to_string());
        }
    };

    let journal = Arc::clone(&state.journal);
    match tokio::task::spawn_blocking(move || journal.summary(&containers, limit)).await {
        Ok(Ok(summary)) => {
            let code = if summary.global_status {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            json_response(code, &summary)
        }
        Ok(Err(e)) => {
            log::error!("Status request failed to read the journal: {e}");
            error_response(e.to_string())
        }
        Err(e) => {
            log::error!("Status request lost its journal read: {e}");
            error_response(e.to_string())
        }
    }
}

fn error_response(error: String) -> Response {
    json_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        &serde_json::json!({ "error": error }),
    )
}

fn json_response<T: Serialize>(code: StatusCode, body: &T) -> Response {
    match serde_json::to_string_pretty(body) {
        Ok(body) => (code, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::container::Container;
    use crate::policy::Policy;
    use crate::tasks::testing::Harness;

    fn state(harness: &Harness) -> Arc<StatusState> {
        Arc::new(StatusState {
            journal: harness.journal.clone(),
            adapter: harness.adapter.clone(),
        })
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let code = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (code, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), 20);
        assert_eq!(parse_limit(Some("abc")), 20);
        assert_eq!(parse_limit(Some("5")), 5);
        assert_eq!(parse_limit(Some("0")), 1);
        assert_eq!(parse_limit(Some("-3")), 1);
        assert_eq!(parse_limit(Some("5000")), 1000);
    }

    #[test]
    fn test_route_path() {
        assert_eq!(route_path(""), "/");
        assert_eq!(route_path("/"), "/");
        assert_eq!(route_path("status"), "/status/");
        assert_eq!(route_path("/status/"), "/status/");
    }

    #[tokio::test]
    async fn test_healthy_fleet_is_ok() {
        let harness = Harness::new("app_");
        harness
            .adapter
            .put(Container::new("app_web_1", "running", 0, "", None, Policy::default()));
        harness.journal.record_restart("app_web_1").unwrap();

        let (code, body) = get_json(create_router("", state(&harness)), "/").await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["global_status"], true);
        assert_eq!(body["constantly_failing_count"], 0);
        assert_eq!(body["last_events"][0]["container"], "app_web_1");
        assert_eq!(body["last_events"][0]["num"], 1);
    }

    #[tokio::test]
    async fn test_failing_container_turns_status_red() {
        let harness = Harness::new("app_");
        let policy = Policy {
            max_restarts_in_frame: 2,
            ..Policy::default()
        };
        harness
            .adapter
            .put(Container::new("app_web_1", "exited", 1, "", None, policy));
        for _ in 0..3 {
            harness.journal.record_restart("app_web_1").unwrap();
        }

        let (code, body) = get_json(create_router("", state(&harness)), "/?limit=2").await;

        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["global_status"], false);
        assert_eq!(body["constantly_failing_count"], 1);
        assert_eq!(body["constantly_failing"][0]["ident"], "app_web_1=False");
        assert_eq!(body["constantly_failing"][0]["restarts_in_current_frame"], 3);
        assert_eq!(body["last_events"].as_array().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_read_the_journal() {
        let harness = Harness::new("app_");
        harness
            .adapter
            .put(Container::new("app_web_1", "running", 0, "", None, Policy::default()));
        harness.journal.record_restart("app_web_1").unwrap();
        let router = create_router("", state(&harness));

        let requests: Vec<_> = (0..8)
            .map(|_| tokio::spawn(get_json(router.clone(), "/?limit=1")))
            .collect();

        for request in requests {
            let (code, body) = request.await.unwrap();
            assert_eq!(code, StatusCode::OK);
            assert_eq!(body["last_events"][0]["container"], "app_web_1");
        }
    }

    #[tokio::test]
    async fn test_runtime_failure_is_reported() {
        let harness = Harness::new("app_");
        harness.adapter.set_unreachable(true);

        let (code, body) = get_json(create_router("", state(&harness)), "/").await;

        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_prefix_moves_the_route() {
        let harness = Harness::new("app_");
        let router = create_router("/repairman", state(&harness));

        let (code, body) = get_json(router.clone(), "/repairman/").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["global_status"], true);

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
