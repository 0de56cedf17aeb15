use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved service id addressing every connected service.
/// No seeded service may use it.
pub const BROADCAST_TARGET: &str = "tous";

/// Identifier of a live gateway connection.
pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    pub display_name: String,
    pub icon_ref: String,
    pub color_ref: String,
    /// Advisory only; the presence registry is authoritative.
    #[serde(default)]
    pub is_online: bool,
}

/// An authenticated user, as returned by the credential verifier.
/// Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    #[serde(rename = "service")]
    pub service_id: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Public,
    Private,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!("unknown message type '{}'", other)),
        }
    }
}

/// Attachment metadata produced by the upload collaborator.
/// Passed through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub name: String,
    pub url: String,
    pub mime_type: String,
}

/// A persisted message. `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub from_user: String,
    pub from_service: String,
    pub to_service: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: Option<String>,
    pub file_ref: Option<FileRef>,
    pub reply_to: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub read_by: BTreeSet<i64>,
}

impl Message {
    /// The audience a persisted message is delivered to.
    pub fn audience(&self) -> Audience {
        match self.message_type {
            MessageType::Public => Audience::All,
            MessageType::Private => Audience::ServicePair {
                from: self.from_service.clone(),
                to: self.to_service.clone(),
            },
        }
    }
}

/// Caller-supplied message fields, before validation.
///
/// Required fields default to empty strings so that an absent field is
/// reported as a missing field rather than a malformed body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    #[serde(default)]
    pub from_user: String,
    #[serde(default)]
    pub from_service: String,
    #[serde(default)]
    pub to_service: String,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_ref: Option<FileRef>,
    #[serde(default)]
    pub reply_to: Option<i64>,
}

/// A validated, normalized draft ready for a durable append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub from_user: String,
    pub from_service: String,
    pub to_service: String,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub file_ref: Option<FileRef>,
    pub reply_to: Option<i64>,
}

/// Who receives a message. Resolved to live connections only at push time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    All,
    ServicePair { from: String, to: String },
}

impl Audience {
    pub fn includes(&self, service_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::ServicePair { from, to } => from == service_id || to == service_id,
        }
    }
}

/// A live connection bound to an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection_id: ConnectionId,
    pub user_id: i64,
    pub username: String,
    pub service_id: String,
    pub connected_at: DateTime<Utc>,
}

/// Roster row published in `users_online`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineUser {
    pub username: String,
    #[serde(rename = "service")]
    pub service_id: String,
}

impl From<&PresenceEntry> for OnlineUser {
    fn from(entry: &PresenceEntry) -> Self {
        Self {
            username: entry.username.clone(),
            service_id: entry.service_id.clone(),
        }
    }
}
