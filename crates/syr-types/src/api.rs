use serde::{Deserialize, Serialize};

use crate::models::Identity;

// -- JWT Claims --

/// Session token claims, shared by syr-api (issuing on login) and
/// syr-gateway (the `identify` handshake).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub service: String,
    pub exp: usize,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            id: claims.sub,
            username: claims.username,
            service_id: claims.service,
        }
    }
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Identity,
    pub token: String,
}

/// Generic error body returned by every failing HTTP route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}
