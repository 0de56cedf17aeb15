use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use syr_db::Database;

#[derive(Debug, Deserialize)]
struct SeedFile {
    users: Vec<SeedUser>,
}

#[derive(Debug, Deserialize)]
struct SeedUser {
    username: String,
    password: String,
    service: String,
}

/// Provision users listed in the seed file. Existing usernames are left alone,
/// so only new accounts pay for hashing.
pub fn provision_users(db: &Database, path: &Path) -> Result<()> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("No seed file at {} ({}), skipping user provisioning", path.display(), e);
            return Ok(());
        }
    };
    let seed: SeedFile = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    let mut created = 0;
    for user in seed.users {
        if db.user_exists(&user.username)? {
            continue;
        }

        let hash = syr_core::auth::hash_password(&user.password)?;
        match db.create_user(&user.username, &hash, &user.service) {
            Ok(_) => created += 1,
            Err(e) => warn!("Could not provision {} ({}): {}", user.username, user.service, e),
        }
    }

    info!("Provisioned {} new users from {}", created, path.display());
    Ok(())
}
