//! Registry of admitted real-time connections.
//!
//! [`ConnectionRegistry`] is the only shared mutable state of the chat
//! relay. It owns every [`Connection`] by value in a `HashMap` keyed by
//! [`ConnectionId`], guarded by a [`tokio::sync::RwLock`]. Nothing else
//! holds a reference to a connection: callers pass the id back into
//! registry methods.
//!
//! Each connection carries the sending half of its bounded outbound queue
//! and a shutdown token. Dropping the sender ends the connection task once
//! the queue drains; [`Recipient::close`] fires the token, which ends it
//! even while a write to the peer is blocked.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;

use super::{ConnectionId, Principal, SessionId, UserId};
use crate::error::DeliveryError;

/// A frame queued for delivery to one connection.
///
/// Transport-neutral: the WebSocket layer translates it into the concrete
/// protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A serialized JSON text frame.
    Text(String),
    /// A liveness probe. The peer is expected to answer with a pong.
    Ping,
    /// Close the transport with the given code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Human-readable close reason.
        reason: &'static str,
    },
}

/// Sending half of a connection's outbound queue.
pub type OutboundSender = mpsc::Sender<OutboundFrame>;

/// One admitted connection.
#[derive(Debug)]
struct Connection {
    principal: Principal,
    session_id: SessionId,
    alive: bool,
    missed_probes: u32,
    opened_at: DateTime<Utc>,
    outbound: OutboundSender,
    shutdown: CancellationToken,
}

impl Connection {
    fn recipient(&self, connection_id: ConnectionId) -> Recipient {
        Recipient {
            connection_id,
            user_id: self.principal.user_id,
            outbound: self.outbound.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Handle to a connection's outbound queue, taken from a registry snapshot.
///
/// Holding a `Recipient` does not keep the connection registered; if the
/// connection is removed meanwhile, [`Recipient::deliver`] fails with
/// [`DeliveryError::RecipientGone`].
#[derive(Debug, Clone)]
pub struct Recipient {
    /// Connection the frame is addressed to.
    pub connection_id: ConnectionId,
    /// Principal bound to that connection.
    pub user_id: UserId,
    outbound: OutboundSender,
    shutdown: CancellationToken,
}

impl Recipient {
    /// Queues `frame` without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::RecipientGone`] if the connection task has
    /// ended and [`DeliveryError::Backpressure`] if its queue is full.
    pub fn deliver(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure(self.connection_id),
            mpsc::error::TrySendError::Closed(_) => {
                DeliveryError::RecipientGone(self.connection_id)
            }
        })
    }

    /// Queues a close frame if there is room, then signals the connection
    /// task to shut down.
    ///
    /// The task gives a queued close frame a short grace period to reach
    /// the peer and drops the transport either way.
    pub fn close(&self, code: u16, reason: &'static str) {
        if let Err(e) = self.deliver(OutboundFrame::Close { code, reason }) {
            tracing::debug!(error = %e, "close frame not queued");
        }
        self.shutdown.cancel();
    }
}

/// Read-only view of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection handle.
    pub connection_id: ConnectionId,
    /// Principal bound at admission.
    pub principal: Principal,
    /// Session the connection was admitted under.
    pub session_id: SessionId,
    /// Current liveness flag.
    pub alive: bool,
    /// Consecutive probes left unanswered.
    pub missed_probes: u32,
    /// When the connection was admitted.
    pub opened_at: DateTime<Utc>,
}

/// Central store for all admitted connections.
///
/// # Concurrency
///
/// Every method is a single critical section under the registry lock.
/// Fan-out never iterates the live map: [`Self::snapshot`] and
/// [`Self::for_each`] copy the recipients out first, so a concurrent
/// `unregister` only makes the later delivery fail for that entry.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a connection for `principal`, returning its new handle.
    ///
    /// The connection starts alive with `opened_at = now`. `shutdown` is
    /// fired by [`Recipient::close`] and [`Self::unregister`].
    pub async fn register(
        &self,
        principal: Principal,
        session_id: SessionId,
        outbound: OutboundSender,
        shutdown: CancellationToken,
    ) -> ConnectionId {
        let connection_id = ConnectionId::new();
        let connection = Connection {
            principal,
            session_id,
            alive: true,
            missed_probes: 0,
            opened_at: Utc::now(),
            outbound,
            shutdown,
        };
        let previous = self
            .connections
            .write()
            .await
            .insert(connection_id, connection);
        debug_assert!(previous.is_none(), "duplicate connection id {connection_id}");
        connection_id
    }

    /// Removes a connection. Returns `true` if it was registered.
    ///
    /// Idempotent: close events and heartbeat eviction may both call this
    /// for the same id.
    pub async fn unregister(&self, connection_id: ConnectionId) -> bool {
        let Some(conn) = self.connections.write().await.remove(&connection_id) else {
            return false;
        };
        conn.shutdown.cancel();
        true
    }

    /// Returns the principal bound to `connection_id`, if registered.
    pub async fn principal(&self, connection_id: ConnectionId) -> Option<Principal> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map(|conn| conn.principal.clone())
    }

    /// Returns a read-only view of one connection.
    pub async fn get(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections
            .read()
            .await
            .get(&connection_id)
            .map(|conn| ConnectionInfo {
                connection_id,
                principal: conn.principal.clone(),
                session_id: conn.session_id,
                alive: conn.alive,
                missed_probes: conn.missed_probes,
                opened_at: conn.opened_at,
            })
    }

    /// Copies out a recipient handle for every registered connection.
    pub async fn snapshot(&self) -> Vec<Recipient> {
        let map = self.connections.read().await;
        map.iter().map(|(id, conn)| conn.recipient(*id)).collect()
    }

    /// Visits every connection registered at the time of the call.
    ///
    /// The visitor runs outside the registry lock, so it may call back into
    /// the registry.
    pub async fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Recipient),
    {
        for recipient in self.snapshot().await {
            visitor(&recipient);
        }
    }

    /// Marks a connection alive after a probe response.
    ///
    /// Returns `false` if the connection is no longer registered.
    pub async fn mark_alive(&self, connection_id: ConnectionId) -> bool {
        let mut map = self.connections.write().await;
        let Some(conn) = map.get_mut(&connection_id) else {
            return false;
        };
        conn.alive = true;
        conn.missed_probes = 0;
        true
    }

    /// Removes every connection that has now missed `max_missed_probes`
    /// consecutive probes.
    ///
    /// A connection whose liveness flag is still `false` counts one more
    /// missed probe. Evicted connections are returned so the caller can
    /// [`Recipient::close`] them.
    pub async fn sweep_dead(&self, max_missed_probes: u32) -> Vec<Recipient> {
        let threshold = max_missed_probes.max(1);
        let mut map = self.connections.write().await;

        let mut dead = Vec::new();
        for (id, conn) in map.iter_mut() {
            if conn.alive {
                continue;
            }
            conn.missed_probes = conn.missed_probes.saturating_add(1);
            if conn.missed_probes >= threshold {
                dead.push(*id);
            }
        }

        dead.into_iter()
            .filter_map(|id| map.remove(&id).map(|conn| conn.recipient(id)))
            .collect()
    }

    /// Starts a probe round: clears every liveness flag and returns the
    /// connections to probe.
    pub async fn arm_probes(&self) -> Vec<Recipient> {
        let mut map = self.connections.write().await;
        map.iter_mut()
            .map(|(id, conn)| {
                conn.alive = false;
                conn.recipient(*id)
            })
            .collect()
    }

    /// Removes every connection bound to `user_id`, returning them.
    pub async fn evict_principal(&self, user_id: UserId) -> Vec<Recipient> {
        self.evict_where(|conn| conn.principal.user_id == user_id).await
    }

    /// Removes every connection admitted under `session_id`, returning
    /// them.
    pub async fn evict_session(&self, session_id: SessionId) -> Vec<Recipient> {
        self.evict_where(|conn| conn.session_id == session_id).await
    }

    async fn evict_where<F>(&self, matches: F) -> Vec<Recipient>
    where
        F: Fn(&Connection) -> bool,
    {
        let mut map = self.connections.write().await;
        let ids: Vec<ConnectionId> = map
            .iter()
            .filter(|(_, conn)| matches(conn))
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter()
            .filter_map(|id| map.remove(&id).map(|conn| conn.recipient(id)))
            .collect()
    }

    /// Returns the number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
