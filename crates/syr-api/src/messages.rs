use axum::{
    Extension, Json,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use syr_types::api::Claims;
use syr_types::events::GatewayEvent;
use syr_types::models::MessageDraft;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
}

/// GET /api/messages: every message, most recent first.
pub async fn list_messages(
    State(state): State<AppState>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    if query.limit == Some(0) {
        return Err(ApiError::BadRequest(format!("limit must be between 1 and {}", MAX_LIMIT)));
    }
    let limit = query.limit.map(|l| l.min(MAX_LIMIT));

    Ok(Json(state.router.store().list_all(limit).await?))
}

/// GET /api/messages/public: most recent first.
pub async fn list_public(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.store().list_public().await?))
}

/// GET /api/messages/private/{service_a}/{service_b}: chronological.
pub async fn list_private(
    State(state): State<AppState>,
    Path((service_a, service_b)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.store().list_private(&service_a, &service_b).await?))
}

/// GET /api/messages/{id}
pub async fn get_message(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.router.store().get(id).await?))
}

/// POST /api/messages: persist, then push to the computed audience.
pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<MessageDraft>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(draft) = payload?;

    // Publishes only after the append has returned
    let routed = state.dispatcher.submit_and_publish(&state.router, draft).await?;

    Ok((StatusCode::CREATED, Json(routed.message)))
}

/// POST /api/messages/{id}/read: the reader is the token's user.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let message = state.router.store().mark_read(id, claims.sub).await?;

    let event = GatewayEvent::MessageRead {
        message_id: id,
        user_id: claims.sub,
    };
    state.dispatcher.deliver(&message.audience(), &event).await;

    Ok(Json(message))
}
