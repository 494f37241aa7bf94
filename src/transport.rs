//! Push-channel plumbing: outbound transport and inbound event bus.
//!
//! ARCHITECTURE
//! ============
//! The WebSocket connection itself (reconnect, heartbeat, auth handshake)
//! lives outside this crate. It plugs in at two points:
//! - outbound: the engine calls [`Transport::send`] with a frame;
//! - inbound: the connection hands every received frame to
//!   [`EventBus::publish`] (or raw text to [`EventBus::publish_text`]).
//!
//! DESIGN
//! ======
//! The bus keeps one unbounded channel per topic and allows exactly one live
//! subscription per topic. Dropping the [`Subscription`] unsubscribes, so a
//! topic can be re-subscribed after its owner goes away but never doubled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::frame::{EventKind, Frame};

// =============================================================================
// OUTBOUND
// =============================================================================

/// Outbound side of the push channel.
pub trait Transport: Send + Sync {
    /// Queue a frame for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be encoded or the connection is
    /// gone.
    fn send(&self, frame: &Frame) -> Result<(), TransportError>;
}

/// In-process transport: outbound frames are serialized to JSON text and
/// queued on a channel drained by whatever owns the socket writer.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    /// Create the transport and the receiver for its outbound text frames.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let json = serde_json::to_string(frame).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.tx.send(json).map_err(|_| TransportError::Closed)
    }
}

// =============================================================================
// INBOUND
// =============================================================================

struct Slot {
    id: u64,
    tx: mpsc::UnboundedSender<Frame>,
}

/// Typed publish/subscribe bus, one channel per topic.
#[derive(Clone, Default)]
pub struct EventBus {
    slots: Arc<Mutex<HashMap<EventKind, Slot>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadySubscribed`] while another live
    /// subscription holds the topic.
    pub fn subscribe(&self, kind: EventKind) -> Result<Subscription, TransportError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&kind).is_some_and(|slot| !slot.tx.is_closed()) {
            return Err(TransportError::AlreadySubscribed(kind.as_str()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        slots.insert(kind, Slot { id, tx });
        debug!(topic = kind.as_str(), "bus: subscribed");

        Ok(Subscription { kind, id, rx, bus: self.clone() })
    }

    /// Route a frame to its topic's subscriber. Returns `false` if the frame
    /// was dropped (unknown topic or nobody listening).
    pub fn publish(&self, frame: Frame) -> bool {
        let Some(kind) = frame.kind() else {
            debug!(event = %frame.event, "bus: ignoring unknown event");
            return false;
        };

        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = slots.get(&kind) else {
            debug!(topic = kind.as_str(), "bus: no subscriber");
            return false;
        };
        slot.tx.send(frame).is_ok()
    }

    /// Parse a raw JSON text frame and publish it.
    pub fn publish_text(&self, text: &str) -> bool {
        match serde_json::from_str::<Frame>(text) {
            Ok(frame) => self.publish(frame),
            Err(e) => {
                warn!(error = %e, "bus: malformed frame");
                false
            }
        }
    }

    /// Whether a live subscriber holds the topic.
    #[must_use]
    pub fn is_subscribed(&self, kind: EventKind) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(&kind).is_some_and(|slot| !slot.tx.is_closed())
    }

    /// Drop every topic's sender. Pending frames are still delivered; after
    /// that each subscriber's `recv` returns `None`.
    pub fn close(&self) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn unsubscribe(&self, kind: EventKind, id: u64) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&kind).is_some_and(|slot| slot.id == id) {
            slots.remove(&kind);
            debug!(topic = kind.as_str(), "bus: unsubscribed");
        }
    }
}

/// Live subscription to one topic. Unsubscribes on drop.
pub struct Subscription {
    kind: EventKind,
    id: u64,
    rx: mpsc::UnboundedReceiver<Frame>,
    bus: EventBus,
}

impl Subscription {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Next frame for this topic; `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.kind, self.id);
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
