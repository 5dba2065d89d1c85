//! Chat fan-out.
//!
//! [`BroadcastRouter::on_message`] turns one inbound text frame into at most
//! one broadcast. Nothing it does can fail the sender's connection: bad
//! frames are dropped and logged, and failed deliveries are skipped.

use std::sync::Arc;

use serde_json::Value;

use super::messages::{CHAT_KIND, ChatMessage, InboundFrame};
use crate::domain::{ConnectionId, ConnectionRegistry, OutboundFrame};
use crate::error::{DeliveryError, MessageError};

/// Fan-out settings.
#[derive(Debug, Clone, Copy)]
pub struct RouterPolicy {
    /// Deliver a message back to its sender too.
    pub echo_to_sender: bool,
    /// Longest accepted message, in chars.
    pub max_message_chars: usize,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            echo_to_sender: true,
            max_message_chars: 2_000,
        }
    }
}

/// What happened to one inbound frame.
#[derive(Debug)]
pub enum RouteOutcome {
    /// A chat message was broadcast.
    Delivered {
        /// The message as sent.
        message: ChatMessage,
        /// Recipients the frame was queued for.
        delivered: usize,
        /// Recipients that could not take it.
        failed: usize,
    },
    /// A well-formed frame of a kind this server does not handle.
    Ignored {
        /// The frame's `type`.
        kind: String,
    },
    /// The frame was malformed and dropped.
    Rejected(MessageError),
    /// The sending connection is no longer registered.
    UnknownSender,
}

/// Parses, stamps, and broadcasts chat frames.
#[derive(Debug)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
    policy: RouterPolicy,
}

impl BroadcastRouter {
    /// Creates a router delivering through `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, policy: RouterPolicy) -> Self {
        Self { registry, policy }
    }

    /// Handles one text frame received on `connection_id`.
    pub async fn on_message(&self, connection_id: ConnectionId, raw: &str) -> RouteOutcome {
        let (text, claimed_name) = match parse_chat(raw, self.policy.max_message_chars) {
            Ok(Parsed::Chat { text, claimed_name }) => (text, claimed_name),
            Ok(Parsed::Other(kind)) => {
                tracing::debug!(%connection_id, kind = %kind, "ignoring frame of unknown type");
                return RouteOutcome::Ignored { kind };
            }
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "dropping malformed frame");
                return RouteOutcome::Rejected(e);
            }
        };

        let Some(sender) = self.registry.principal(connection_id).await else {
            tracing::debug!(%connection_id, "frame from unregistered connection");
            return RouteOutcome::UnknownSender;
        };
        if let Some(claimed) = claimed_name.filter(|name| *name != sender.label) {
            tracing::debug!(
                %connection_id,
                user_id = %sender.user_id,
                claimed = %claimed,
                "ignoring client-asserted username"
            );
        }

        let message = ChatMessage::new(&sender, text);
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize chat message");
                return RouteOutcome::Rejected(MessageError::Malformed(e));
            }
        };

        let (delivered, failed) = self.fan_out(connection_id, &json).await;
        tracing::debug!(
            %connection_id,
            user_id = %sender.user_id,
            delivered,
            failed,
            "chat message broadcast"
        );

        RouteOutcome::Delivered {
            message,
            delivered,
            failed,
        }
    }

    async fn fan_out(&self, sender: ConnectionId, json: &str) -> (usize, usize) {
        let mut delivered = 0;
        let mut failed = 0;
        let echo = self.policy.echo_to_sender;

        self.registry
            .for_each(|recipient| {
                if !echo && recipient.connection_id == sender {
                    return;
                }
                match recipient.deliver(OutboundFrame::Text(json.to_string())) {
                    Ok(()) => delivered += 1,
                    Err(e @ DeliveryError::RecipientGone(_)) => {
                        tracing::debug!(error = %e, "skipping closed recipient");
                        failed += 1;
                    }
                    Err(e @ DeliveryError::Backpressure(_)) => {
                        tracing::warn!(error = %e, "dropping chat message for slow recipient");
                        failed += 1;
                    }
                }
            })
            .await;

        (delivered, failed)
    }
}

enum Parsed {
    Chat {
        text: String,
        claimed_name: Option<String>,
    },
    Other(String),
}

fn parse_chat(raw: &str, max_chars: usize) -> Result<Parsed, MessageError> {
    let frame: InboundFrame = serde_json::from_str(raw)?;
    if frame.kind != CHAT_KIND {
        return Ok(Parsed::Other(frame.kind));
    }

    let Some(Value::String(text)) = frame.message else {
        return Err(MessageError::MissingText);
    };
    if text.trim().is_empty() {
        return Err(MessageError::EmptyText);
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(MessageError::TooLong {
            len,
            max: max_chars,
        });
    }

    Ok(Parsed::Chat {
        text,
        claimed_name: frame.username,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::domain::{Principal, SessionId, UserId};

    struct Peer {
        id: ConnectionId,
        principal: Principal,
        rx: mpsc::Receiver<OutboundFrame>,
    }

    async fn join(registry: &ConnectionRegistry, label: &str) -> Peer {
        let principal = Principal {
            user_id: UserId::new(),
            label: label.to_string(),
        };
        let (tx, rx) = mpsc::channel(8);
        let id = registry
            .register(principal.clone(), SessionId::new(), tx, CancellationToken::new())
            .await;
        Peer { id, principal, rx }
    }

    fn router(registry: &Arc<ConnectionRegistry>, echo: bool) -> BroadcastRouter {
        BroadcastRouter::new(
            Arc::clone(registry),
            RouterPolicy {
                echo_to_sender: echo,
                max_message_chars: 16,
            },
        )
    }

    fn received(peer: &mut Peer) -> Vec<ChatMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = peer.rx.try_recv() {
            let OutboundFrame::Text(json) = frame else {
                panic!("expected a text frame");
            };
            let Ok(msg) = serde_json::from_str::<ChatMessage>(&json) else {
                panic!("outbound frame is not a chat message");
            };
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn broadcasts_with_server_identity_and_timestamp() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut a = join(&registry, "a@example.com").await;
        let mut b = join(&registry, "b@example.com").await;
        let mut c = join(&registry, "c@example.com").await;
        let Some(a_info) = registry.get(a.id).await else {
            panic!("a should be registered");
        };

        let outcome = router(&registry, false)
            .on_message(a.id, r#"{"type":"chat","message":"hello","username":"mallory"}"#)
            .await;
        assert!(matches!(
            outcome,
            RouteOutcome::Delivered {
                delivered: 2,
                failed: 0,
                ..
            }
        ));

        for peer in [&mut b, &mut c] {
            let msgs = received(peer);
            assert_eq!(msgs.len(), 1);
            let Some(msg) = msgs.first() else {
                panic!("expected one message");
            };
            assert_eq!(msg.message, "hello");
            assert_eq!(msg.sender_id, a.principal.user_id);
            assert_eq!(msg.username, "a@example.com");
            assert!(msg.timestamp > a_info.opened_at);
        }
        assert!(received(&mut a).is_empty());
    }

    #[tokio::test]
    async fn echo_delivers_exactly_one_copy_to_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut a = join(&registry, "a@example.com").await;
        let mut b = join(&registry, "b@example.com").await;

        let outcome = router(&registry, true)
            .on_message(a.id, r#"{"type":"chat","message":"hi"}"#)
            .await;
        assert!(matches!(outcome, RouteOutcome::Delivered { delivered: 2, .. }));
        assert_eq!(received(&mut a).len(), 1);
        assert_eq!(received(&mut b).len(), 1);
    }

    #[tokio::test]
    async fn malformed_frames_leave_registry_untouched() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut a = join(&registry, "a@example.com").await;
        let mut b = join(&registry, "b@example.com").await;
        let router = router(&registry, true);

        for raw in [
            "not json",
            r#"{"message":"no type"}"#,
            r#"{"type":"chat"}"#,
            r#"{"type":"chat","message":42}"#,
            r#"{"type":"chat","message":"   "}"#,
            r#"{"type":"chat","message":"this text is far too long"}"#,
            "",
        ] {
            let outcome = router.on_message(a.id, raw).await;
            assert!(matches!(outcome, RouteOutcome::Rejected(_)), "{raw}");
        }

        assert_eq!(registry.len().await, 2);
        assert!(received(&mut a).is_empty());
        assert!(received(&mut b).is_empty());
    }

    #[tokio::test]
    async fn unknown_kinds_are_ignored() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut a = join(&registry, "a@example.com").await;

        let outcome = router(&registry, true)
            .on_message(a.id, r#"{"type":"typing"}"#)
            .await;
        let RouteOutcome::Ignored { kind } = outcome else {
            panic!("expected the frame to be ignored");
        };
        assert_eq!(kind, "typing");
        assert!(received(&mut a).is_empty());
    }

    #[tokio::test]
    async fn unregistered_sender_is_dropped() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut b = join(&registry, "b@example.com").await;

        let outcome = router(&registry, true)
            .on_message(ConnectionId::new(), r#"{"type":"chat","message":"hi"}"#)
            .await;
        assert!(matches!(outcome, RouteOutcome::UnknownSender));
        assert!(received(&mut b).is_empty());
    }

    #[tokio::test]
    async fn failed_recipient_does_not_block_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let a = join(&registry, "a@example.com").await;
        let gone = join(&registry, "gone@example.com").await;
        let mut c = join(&registry, "c@example.com").await;
        drop(gone.rx);

        let outcome = router(&registry, false)
            .on_message(a.id, r#"{"type":"chat","message":"hi"}"#)
            .await;
        assert!(matches!(
            outcome,
            RouteOutcome::Delivered {
                delivered: 1,
                failed: 1,
                ..
            }
        ));
        assert_eq!(received(&mut c).len(), 1);
    }
}
