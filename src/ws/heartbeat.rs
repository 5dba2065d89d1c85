//! Ping/pong liveness tracking.
//!
//! Every tick first evicts connections that left the previous probe
//! unanswered, then clears the liveness flag of every survivor and pings
//! it. A pong at any time before the next tick marks the connection alive
//! again (see [`ConnectionRegistry::mark_alive`]). With the default
//! tolerance of one missed probe, a dead peer is dropped within two
//! periods.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::close_code;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::domain::{ConnectionId, ConnectionRegistry, OutboundFrame};

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    /// Time between probe rounds.
    pub interval: Duration,
    /// Consecutive unanswered probes that evict a connection.
    pub max_missed_probes: u32,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_missed_probes: 1,
        }
    }
}

/// Result of one heartbeat round.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Connections removed this round.
    pub evicted: Vec<ConnectionId>,
    /// Connections pinged this round.
    pub probed: usize,
}

/// Periodically probes and evicts registered connections.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    registry: Arc<ConnectionRegistry>,
    policy: HeartbeatPolicy,
}

impl HeartbeatMonitor {
    /// Creates a monitor over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, policy: HeartbeatPolicy) -> Self {
        Self { registry, policy }
    }

    /// Runs one heartbeat round.
    pub async fn tick(&self) -> TickReport {
        let dead = self.registry.sweep_dead(self.policy.max_missed_probes).await;
        let mut evicted = Vec::with_capacity(dead.len());
        for recipient in dead {
            recipient.close(close_code::NORMAL, "heartbeat timeout");
            tracing::info!(
                connection_id = %recipient.connection_id,
                user_id = %recipient.user_id,
                "evicting unresponsive connection"
            );
            evicted.push(recipient.connection_id);
        }

        let targets = self.registry.arm_probes().await;
        for recipient in &targets {
            if let Err(e) = recipient.deliver(OutboundFrame::Ping) {
                tracing::debug!(error = %e, "probe not queued");
            }
        }

        TickReport {
            evicted,
            probed: targets.len(),
        }
    }

    /// Spawns the monitor loop. The first round runs one full interval
    /// after the call.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.policy.interval;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = period.as_secs(),
                max_missed_probes = self.policy.max_missed_probes,
                "heartbeat monitor started"
            );
            loop {
                interval.tick().await;
                let report = self.tick().await;
                if !report.evicted.is_empty() {
                    tracing::debug!(
                        evicted = report.evicted.len(),
                        probed = report.probed,
                        "heartbeat round"
                    );
                }
            }
        })
    }
}
