use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{messages, services};

/// HTTP surface. The server binary merges in the WebSocket route and adds
/// the CORS and trace layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/health", get(health))
        .route("/api/login", post(auth::login))
        .route("/api/services", get(services::list_services))
        .route("/api/users/online", get(services::online_users))
        .route("/api/messages", get(messages::list_messages).post(messages::send_message))
        .route("/api/messages/public", get(messages::list_public))
        .route("/api/messages/private/{service_a}/{service_b}", get(messages::list_private))
        .route("/api/messages/{id}", get(messages::get_message))
        .route(
            "/api/messages/{id}/read",
            post(messages::mark_read).route_layer(middleware::from_fn_with_state(state.clone(), require_auth)),
        )
        .with_state(state)
}

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "message": "SYR backend is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}
