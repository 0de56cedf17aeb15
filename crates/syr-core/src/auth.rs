use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use syr_db::Database;
use syr_types::models::Identity;
use tracing::{error, warn};

use crate::error::AuthError;

/// Verified against when no account matches, so an unknown user costs the
/// same Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_password("syr-unknown-account").ok());

/// Checks (username, password, service) triples against stored identities.
/// Read-only.
#[derive(Clone)]
pub struct CredentialVerifier {
    db: Arc<Database>,
}

impl CredentialVerifier {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn verify(&self, username: &str, password: &str, service_id: &str) -> Result<Identity, AuthError> {
        let (username, password, service_id) = (username.trim(), password.trim(), service_id.trim());
        if username.is_empty() || password.is_empty() || service_id.is_empty() {
            return Err(AuthError::MissingFields);
        }

        // Argon2 is CPU-heavy; keep it off the async workers
        let db = self.db.clone();
        let (username, password, service_id) = (username.to_string(), password.to_string(), service_id.to_string());
        tokio::task::spawn_blocking(move || check(&db, &username, &password, &service_id))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                AuthError::Unavailable("verifier task failed".into())
            })?
    }
}

fn check(db: &Database, username: &str, password: &str, service_id: &str) -> Result<Identity, AuthError> {
    let found = db.get_user_for_service(username, service_id).map_err(|e| {
        error!("Credential lookup failed: {}", e);
        AuthError::Unavailable(e.to_string())
    })?;

    let Some(user) = found else {
        burn_dummy_verify(password);
        warn!("Login rejected for {} ({})", username, service_id);
        return Err(AuthError::InvalidCredentials);
    };

    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        error!("Stored hash for user {} is unreadable: {}", user.id, e);
        AuthError::Unavailable("corrupt credential".into())
    })?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Login rejected for {} ({})", username, service_id);
            AuthError::InvalidCredentials
        })?;

    Ok(Identity {
        id: user.id,
        username: user.username,
        service_id: user.service_id,
    })
}

fn burn_dummy_verify(password: &str) {
    if let Some(parsed) = DUMMY_HASH.as_deref().and_then(|h| PasswordHash::new(h).ok()) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}

/// Hash a password with Argon2id for provisioning.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}
