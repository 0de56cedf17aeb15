use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::AppState;

/// GET /api/services: ordered by display name, online flag from live presence.
pub async fn list_services(State(state): State<AppState>) -> impl IntoResponse {
    let live = state.dispatcher.presence().entries().await;
    Json(state.router.directory().list_with_presence(&live))
}

/// GET /api/users/online
pub async fn online_users(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.presence().snapshot().await)
}
