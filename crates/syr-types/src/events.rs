use serde::{Deserialize, Serialize};

use crate::models::{Identity, Message, MessageDraft, MessageType, OnlineUser};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Handshake accepted
    Ready { user: Identity },

    /// A public message was persisted
    NewMessage(Message),

    /// A private message between two services was persisted
    NewPrivateMessage(Message),

    /// Full presence roster, sent on every connect and disconnect
    UsersOnline(Vec<OnlineUser>),

    /// Reply to a `send_message` command, sent to the submitter only
    MessageAck {
        request_id: Option<String>,
        message: Message,
    },

    /// A user was added to a message's read set
    MessageRead { message_id: i64, user_id: i64 },

    /// A command failed; sent to the issuing connection only
    CommandError {
        request_id: Option<String>,
        code: String,
        error: String,
    },
}

impl GatewayEvent {
    /// Live event announcing a freshly persisted message.
    pub fn for_message(message: Message) -> Self {
        match message.message_type {
            MessageType::Public => Self::NewMessage(message),
            MessageType::Private => Self::NewPrivateMessage(message),
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the connection with a login token
    Identify { token: String },

    /// Authenticate the connection with credentials
    Authenticate {
        username: String,
        password: String,
        service: String,
    },

    /// Submit a message through the routing engine
    SendMessage {
        #[serde(default)]
        request_id: Option<String>,
        message: MessageDraft,
    },

    /// Mark a message as read by this connection's user
    MarkRead { message_id: i64 },
}
