//! WebSocket layer: admission, the per-connection task, chat fan-out, and
//! heartbeat.
//!
//! The endpoint at `/ws` carries one shared chat channel. Every connection
//! is admitted by session cookie before upgrade, registered in the
//! [`crate::domain::ConnectionRegistry`], and probed by the
//! [`heartbeat::HeartbeatMonitor`].

pub mod connection;
pub mod handler;
pub mod heartbeat;
pub mod messages;
pub mod router;

pub use heartbeat::{HeartbeatMonitor, HeartbeatPolicy};
pub use router::{BroadcastRouter, RouteOutcome, RouterPolicy};
