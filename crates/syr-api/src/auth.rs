use std::sync::Arc;

use axum::{Json, extract::State, extract::rejection::JsonRejection, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use syr_core::{CredentialVerifier, RoutingEngine};
use syr_gateway::Dispatcher;
use syr_types::api::{Claims, LoginRequest, LoginResponse};
use syr_types::models::Identity;

use crate::error::{ApiError, ApiResult};

/// Session tokens are valid for 30 days.
const TOKEN_TTL_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub verifier: CredentialVerifier,
    pub router: RoutingEngine,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
}

/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let user = state.verifier.verify(&req.username, &req.password, &req.service).await?;

    let token = create_token(&state.jwt_secret, &user).map_err(|e| ApiError::Internal(e.to_string()))?;

    info!("{} logged in ({})", user.username, user.service_id);
    Ok(Json(LoginResponse {
        success: true,
        user,
        token,
    }))
}

pub fn create_token(secret: &str, user: &Identity) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        service: user.service_id.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}
