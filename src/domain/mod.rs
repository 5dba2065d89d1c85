//! Domain layer: identifiers, accounts, sessions, and the connection
//! registry.
//!
//! Everything here is transport-agnostic. The WebSocket layer drives the
//! [`ConnectionRegistry`] through [`ConnectionId`] handles only.

pub mod connection_registry;
pub mod ids;
pub mod session;
pub mod user;

pub use connection_registry::{
    ConnectionInfo, ConnectionRegistry, OutboundFrame, OutboundSender, Recipient,
};
pub use ids::{ConnectionId, SessionId, UserId};
pub use session::Session;
pub use user::{Principal, UserRecord};
