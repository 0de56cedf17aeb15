use std::sync::Arc;

use syr_types::models::{Audience, BROADCAST_TARGET, Message, MessageDraft, MessageType, NewMessage};
use tracing::{info, warn};

use crate::directory::ServiceDirectory;
use crate::error::RouteError;
use crate::store::MessageStore;

/// A persisted message and the audience it must be delivered to.
#[derive(Debug, Clone)]
pub struct Routed {
    pub message: Message,
    pub audience: Audience,
}

/// Validates submissions, persists them, and computes their audience.
/// Does not push anything itself.
#[derive(Clone)]
pub struct RoutingEngine {
    store: MessageStore,
    directory: Arc<ServiceDirectory>,
}

impl RoutingEngine {
    pub fn new(store: MessageStore, directory: Arc<ServiceDirectory>) -> Self {
        Self { store, directory }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn directory(&self) -> &ServiceDirectory {
        &self.directory
    }

    pub async fn submit(&self, draft: MessageDraft) -> Result<Routed, RouteError> {
        let new = self.normalize(draft).inspect_err(|e| warn!("Rejected submission: {}", e))?;

        let message = self.store.append(new).await?;
        info!(
            "Message {} accepted ({} {} -> {})",
            message.id, message.message_type, message.from_service, message.to_service
        );

        // Audience comes from the stored record, not the draft
        let audience = message.audience();
        Ok(Routed { message, audience })
    }

    /// Validate a draft and apply defaults.
    ///
    /// A public message always targets the broadcast id; a conflicting
    /// `toService` is overwritten rather than rejected.
    pub fn normalize(&self, draft: MessageDraft) -> Result<NewMessage, RouteError> {
        let from_user = draft.from_user.trim();
        let from_service = draft.from_service.trim();
        let to_service = draft.to_service.trim();
        if from_user.is_empty() || from_service.is_empty() || to_service.is_empty() {
            return Err(RouteError::MissingFields);
        }

        let message_type = draft.message_type.unwrap_or_default();
        let to_service = match message_type {
            MessageType::Public => BROADCAST_TARGET,
            MessageType::Private => to_service,
        };

        if !self.directory.is_valid_target(from_service) {
            return Err(RouteError::UnknownService(from_service.to_string()));
        }
        if !self.directory.is_valid_target(to_service) {
            return Err(RouteError::UnknownService(to_service.to_string()));
        }
        if !self.directory.is_service(from_service) {
            return Err(RouteError::InvalidTarget(from_service.to_string()));
        }
        if message_type == MessageType::Private && !self.directory.is_service(to_service) {
            return Err(RouteError::InvalidTarget(to_service.to_string()));
        }

        Ok(NewMessage {
            from_user: from_user.to_string(),
            from_service: from_service.to_string(),
            to_service: to_service.to_string(),
            message_type,
            content: draft.content,
            file_ref: draft.file_ref,
            reply_to: draft.reply_to,
        })
    }
}
