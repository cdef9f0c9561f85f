//! The plain HTTP surface alongside the WebSocket route: `/health`,
//! `/stats`, `/rooms`. See `spec.md` §6. JSON responses replace the
//! teacher's `enlist`/`reload` human-readable text dumps, since this
//! protocol's consumers are dashboards/tooling rather than a developer
//! eyeballing curl output.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::manager::RoomManager;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
}

pub async fn health_handler(State(manager): State<Arc<RoomManager>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime: manager.uptime_seconds(),
    })
}

pub async fn stats_handler(State(manager): State<Arc<RoomManager>>) -> impl IntoResponse {
    Json(manager.get_stats().await)
}

pub async fn rooms_handler(State(manager): State<Arc<RoomManager>>) -> impl IntoResponse {
    Json(manager.get_room_list().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn health_reports_ok_and_a_nonzero_uptime_field() {
        let manager = Arc::new(RoomManager::new(Config::default()));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let response = health_handler(State(manager)).await.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert!(value["uptime"].is_u64());
    }
}
