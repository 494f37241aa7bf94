use super::*;
use crate::frame::{EVENT_CHAT_MESSAGE, EVENT_TYPING_INDICATOR};
use uuid::Uuid;

fn typing_frame() -> Frame {
    Frame::new(
        EVENT_TYPING_INDICATOR,
        serde_json::json!({
            "user_id": Uuid::new_v4(),
            "conversation_id": Uuid::new_v4(),
            "is_typing": true
        }),
    )
}

// =============================================================================
// ChannelTransport
// =============================================================================

#[test]
fn channel_transport_serializes_frames() {
    let (transport, mut rx) = ChannelTransport::new();
    let conv = Uuid::new_v4();
    transport.send(&Frame::typing(conv, true)).unwrap();

    let text = rx.try_recv().unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["type"], "typing_indicator");
    assert_eq!(json["payload"]["conversation_id"], conv.to_string());
}

#[test]
fn channel_transport_closed_receiver_errors() {
    let (transport, rx) = ChannelTransport::new();
    drop(rx);
    assert_eq!(transport.send(&Frame::typing(Uuid::new_v4(), true)), Err(TransportError::Closed));
}

// =============================================================================
// EventBus subscription rules
// =============================================================================

#[test]
fn second_live_subscription_is_refused() {
    let bus = EventBus::new();
    let _first = bus.subscribe(EventKind::ChatMessage).unwrap();
    assert!(matches!(
        bus.subscribe(EventKind::ChatMessage),
        Err(TransportError::AlreadySubscribed("chat_message"))
    ));
    // Other topics are independent.
    assert!(bus.subscribe(EventKind::TypingIndicator).is_ok());
}

#[test]
fn dropping_subscription_frees_topic() {
    let bus = EventBus::new();
    let first = bus.subscribe(EventKind::ChatMessage).unwrap();
    assert!(bus.is_subscribed(EventKind::ChatMessage));
    drop(first);
    assert!(!bus.is_subscribed(EventKind::ChatMessage));
    assert!(bus.subscribe(EventKind::ChatMessage).is_ok());
}

#[test]
fn stale_drop_does_not_evict_newer_subscription() {
    let bus = EventBus::new();
    let first = bus.subscribe(EventKind::TypingIndicator).unwrap();
    bus.close();
    let _second = bus.subscribe(EventKind::TypingIndicator).unwrap();
    drop(first);
    assert!(bus.is_subscribed(EventKind::TypingIndicator));
}

// =============================================================================
// EventBus routing
// =============================================================================

#[tokio::test]
async fn publish_routes_by_topic() {
    let bus = EventBus::new();
    let mut typing = bus.subscribe(EventKind::TypingIndicator).unwrap();
    let mut chat = bus.subscribe(EventKind::ChatMessage).unwrap();

    assert!(bus.publish(typing_frame()));
    let got = typing.recv().await.unwrap();
    assert_eq!(got.event, EVENT_TYPING_INDICATOR);
    assert!(chat.rx.try_recv().is_err());
}

#[test]
fn publish_without_subscriber_is_dropped() {
    let bus = EventBus::new();
    assert!(!bus.publish(Frame::new(EVENT_CHAT_MESSAGE, serde_json::json!({}))));
}

#[test]
fn publish_unknown_event_is_dropped() {
    let bus = EventBus::new();
    let _sub = bus.subscribe(EventKind::ChatMessage).unwrap();
    assert!(!bus.publish(Frame::new("presence_update", serde_json::json!({}))));
}

#[tokio::test]
async fn publish_text_parses_and_routes() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventKind::TypingIndicator).unwrap();
    let text = serde_json::to_string(&typing_frame()).unwrap();

    assert!(bus.publish_text(&text));
    assert!(sub.recv().await.is_some());
    assert!(!bus.publish_text("{broken"));
}

#[tokio::test]
async fn close_ends_subscriptions() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(EventKind::ChatMessage).unwrap();
    bus.close();
    assert!(sub.recv().await.is_none());
}
