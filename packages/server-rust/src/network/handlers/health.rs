//! Health and liveness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns router statistics as JSON, including each session's age and the
/// topics that currently have subscribers.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let router = &state.router;
    let registry = router.registry();

    let sessions: Vec<_> = registry
        .ids()
        .into_iter()
        .filter_map(|id| registry.get(id))
        .map(|handle| {
            json!({
                "id": handle.id.to_string(),
                "connected_secs": handle.connected_at.elapsed().as_secs(),
            })
        })
        .collect();
    let mut topic_names = router.subscriptions().topics();
    topic_names.sort_unstable();

    Json(json!({
        "connections": registry.count(),
        "topics": router.subscriptions().topic_count(),
        "procedures": router.calls().len(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "sessions": sessions,
        "topic_names": topic_names,
    }))
}

/// Liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}
