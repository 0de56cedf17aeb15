use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub store_timeout: Duration,
    pub seed_file: PathBuf,
}

impl Config {
    /// Read `SYR_*` variables, falling back to development defaults.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: var_or("SYR_HOST", "0.0.0.0"),
            port: parse_var("SYR_PORT", 10000)?,
            db_path: PathBuf::from(var_or("SYR_DB_PATH", "syr.db")),
            jwt_secret: var_or("SYR_JWT_SECRET", "dev-secret-change-me"),
            store_timeout: Duration::from_millis(parse_var("SYR_STORE_TIMEOUT_MS", 5000)?),
            seed_file: PathBuf::from(var_or("SYR_SEED_FILE", "seed.json")),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
