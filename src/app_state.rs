//! Shared application state injected into all Axum handlers.
//!
//! [`AppState::build`] is the composition root: it creates the single
//! [`ConnectionRegistry`] and hands it to every component that needs it.

use std::sync::Arc;

use crate::auth::{AuthGate, CookiePolicy, IdentityVerifier, SessionStore};
use crate::config::GatewayConfig;
use crate::domain::ConnectionRegistry;
use crate::persistence::Persistence;
use crate::service::AuthService;
use crate::ws::{BroadcastRouter, HeartbeatMonitor, HeartbeatPolicy, RouterPolicy};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// Account operations.
    pub auth_service: Arc<AuthService>,
    /// Session cookie → principal resolution.
    pub auth_gate: Arc<AuthGate>,
    /// Session cookie attributes.
    pub cookies: Arc<CookiePolicy>,
    /// All admitted chat connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Chat fan-out.
    pub router: Arc<BroadcastRouter>,
}

impl AppState {
    /// Wires every component over `persistence`.
    #[must_use]
    pub fn build(config: GatewayConfig, persistence: Persistence) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let sessions = SessionStore::new(persistence.clone(), config.session_ttl());
        let identities = IdentityVerifier::new(persistence.clone());

        let auth_gate = Arc::new(AuthGate::new(
            sessions.clone(),
            identities,
            config.session_cookie_name.clone(),
        ));
        let auth_service = Arc::new(AuthService::new(
            persistence,
            sessions,
            Arc::clone(&registry),
        ));
        let router = Arc::new(BroadcastRouter::new(
            Arc::clone(&registry),
            RouterPolicy {
                echo_to_sender: config.chat_echo_to_sender,
                max_message_chars: config.chat_max_message_chars,
            },
        ));
        let cookies = Arc::new(CookiePolicy {
            name: config.session_cookie_name.clone(),
            secure: config.cookie_secure,
        });

        Self {
            config: Arc::new(config),
            auth_service,
            auth_gate,
            cookies,
            registry,
            router,
        }
    }

    /// Creates the heartbeat monitor for this state's registry.
    #[must_use]
    pub fn heartbeat_monitor(&self) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            Arc::clone(&self.registry),
            HeartbeatPolicy {
                interval: self.config.heartbeat_interval(),
                max_missed_probes: self.config.heartbeat_max_missed_probes,
            },
        )
    }
}
