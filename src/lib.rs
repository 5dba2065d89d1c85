//! # livechat-gateway
//!
//! Account API and session-authenticated WebSocket chat relay for a
//! live-video streaming site.
//!
//! Clients log in over HTTP and receive a session cookie. The same cookie
//! admits them to `/ws`, where every chat message is stamped with the
//! sender's server-verified identity and broadcast to all live
//! connections. A heartbeat evicts peers that stop answering pings.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/) ── AuthGate (auth/)
//!     │
//!     ├── AuthService (service/)
//!     ├── BroadcastRouter, HeartbeatMonitor (ws/)
//!     │
//!     ├── ConnectionRegistry (domain/)
//!     │
//!     └── Persistence: in-memory or PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
pub mod ws;
