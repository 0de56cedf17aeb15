//! Database row types: these map directly to SQLite rows.
//! Distinct from syr-types API models to keep the DB layer independent.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use syr_types::models::{FileRef, Message, Service};

use crate::error::{StoreError, StoreResult};

/// Fixed-width storage format so lexical order is chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub service_id: String,
}

pub struct ServiceRow {
    pub id: String,
    pub display_name: String,
    pub icon_ref: String,
    pub color_ref: String,
}

pub struct MessageRow {
    pub id: i64,
    pub from_user: String,
    pub from_service: String,
    pub to_service: String,
    pub message_type: String,
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub reply_to: Option<i64>,
    pub created_at: String,
    pub read_by: String,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            display_name: row.display_name,
            icon_ref: row.icon_ref,
            color_ref: row.color_ref,
            is_online: false,
        }
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> StoreResult<Self> {
        let message_type = row.message_type.parse().map_err(|e: String| {
            StoreError::Unavailable(format!("corrupt message {}: {}", row.id, e))
        })?;

        let file_ref = match (row.file_name, row.file_url) {
            (Some(name), Some(url)) => Some(FileRef {
                name,
                url,
                mime_type: row.file_type.unwrap_or_default(),
            }),
            _ => None,
        };

        let read_by: BTreeSet<i64> = serde_json::from_str(&row.read_by)?;

        Ok(Message {
            id: row.id,
            from_user: row.from_user,
            from_service: row.from_service,
            to_service: row.to_service,
            message_type,
            content: row.content,
            file_ref,
            reply_to: row.reply_to,
            created_at: parse_timestamp(&row.created_at)?,
            read_by,
        })
    }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|ndt| ndt.and_utc())
        .map_err(|e| StoreError::Unavailable(format!("corrupt timestamp '{}': {}", raw, e)))
}
