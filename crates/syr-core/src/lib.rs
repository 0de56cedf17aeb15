//! Message routing, persistence and presence for the SYR chat backend.
//!
//! Transport-agnostic: nothing here speaks HTTP or WebSocket. The gateway
//! and API crates drive these components and push the results.

pub mod auth;
pub mod directory;
pub mod error;
pub mod presence;
pub mod routing;
pub mod store;

pub use auth::CredentialVerifier;
pub use directory::ServiceDirectory;
pub use error::{AuthError, RouteError};
pub use presence::PresenceRegistry;
pub use routing::{Routed, RoutingEngine};
pub use store::MessageStore;
pub use syr_db::StoreError;
