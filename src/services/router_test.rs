use std::time::Duration;

use super::*;
use crate::frame::{EVENT_CHAT_MESSAGE, EVENT_TYPING_INDICATOR, TypingPayload};
use crate::model::Message;
use crate::state::SessionState;
use crate::state::test_helpers::{MockApi, RecordingNotifier, base_time, chat_frame, conversation, raw_message};
use crate::transport::ChannelTransport;
use tokio::sync::mpsc::UnboundedReceiver;

struct Fixture {
    api: Arc<MockApi>,
    state: SharedState,
    notifier: Arc<RecordingNotifier>,
    router: RealtimeEventRouter,
    outbound: UnboundedReceiver<String>,
}

fn fixture_with(notifier: RecordingNotifier) -> Fixture {
    let user_id = Uuid::new_v4();
    let api = MockApi::new(user_id);
    let state = SessionState::shared();
    let unread = UnreadCounter::new(api.clone(), state.clone());
    let store = ConversationStore::new(api.clone(), state.clone(), unread.clone(), None);
    let notifier = Arc::new(notifier);
    let (transport, outbound) = ChannelTransport::new();
    let router = RealtimeEventRouter {
        api: api.clone(),
        state: state.clone(),
        store,
        unread,
        typing: TypingTracker::new(Duration::from_millis(3000)),
        notifier: notifier.clone(),
        transport: Arc::new(transport),
        user_id,
    };
    Fixture { api, state, notifier, router, outbound }
}

fn fixture() -> Fixture {
    fixture_with(RecordingNotifier::default())
}

/// Two conversations, C1 older than C2, C1 open with two messages.
async fn open_c1(f: &Fixture) -> (Uuid, Uuid) {
    let c1 = Uuid::new_v4();
    let c2 = Uuid::new_v4();
    f.api.add_conversation(conversation(c1, false, base_time()));
    f.api.add_conversation(conversation(c2, false, base_time() - time::Duration::hours(1)));
    f.router.store.load().await.unwrap();

    let mut state = f.state.write().await;
    state.active_conversation = Some(c1);
    for text in ["one", "two"] {
        state.append_message(Message::from_raw(raw_message(c1, Uuid::new_v4(), text, base_time())));
    }
    drop(state);
    (c1, c2)
}

fn decode_payload(frame: &Frame) -> ChatMessagePayload {
    frame.decode().unwrap()
}

// =============================================================================
// chat_message
// =============================================================================

#[tokio::test]
async fn background_message_updates_list_and_badge_only() {
    let f = fixture();
    let (c1, c2) = open_c1(&f).await;
    let before: Vec<Uuid> = f.state.read().await.messages.iter().map(|m| m.id).collect();

    let peer = Uuid::new_v4();
    let raw = f.api.deliver(c2, peer, "psst");
    f.router.handle_chat_message(decode_payload(&chat_frame(&raw))).await;

    let state = f.state.read().await;
    let after: Vec<Uuid> = state.messages.iter().map(|m| m.id).collect();
    assert_eq!(after, before);
    assert_eq!(state.active_conversation, Some(c1));
    assert_eq!(state.unread_count, 1);
    assert_eq!(state.conversations[0].id, c2);
    assert_eq!(f.api.call_count("mark_conversation_read"), 0);
    assert_eq!(f.notifier.seen(), vec![raw.id]);
}

#[tokio::test]
async fn active_message_is_appended_and_marked_read() {
    let f = fixture();
    let (c1, _) = open_c1(&f).await;

    let raw = f.api.deliver(c1, Uuid::new_v4(), "hey");
    f.router.handle_chat_message(decode_payload(&chat_frame(&raw))).await;

    let state = f.state.read().await;
    assert_eq!(state.messages.len(), 3);
    assert_eq!(state.messages.last().map(|m| m.id), Some(raw.id));
    assert_eq!(state.unread_count, 0);
    assert_eq!(f.api.call_count("mark_conversation_read"), 1);
}

#[tokio::test]
async fn duplicate_push_is_not_appended_twice() {
    let f = fixture();
    let (c1, _) = open_c1(&f).await;
    let raw = f.api.deliver(c1, Uuid::new_v4(), "once");
    let frame = chat_frame(&raw);

    f.router.handle_chat_message(decode_payload(&frame)).await;
    f.router.handle_chat_message(decode_payload(&frame)).await;

    assert_eq!(f.state.read().await.messages.len(), 3);
}

#[tokio::test]
async fn own_message_is_not_notified() {
    let f = fixture();
    let (c1, _) = open_c1(&f).await;
    let raw = f.api.deliver(c1, f.router.user_id, "mine");

    f.router.handle_chat_message(decode_payload(&chat_frame(&raw))).await;

    assert!(f.notifier.seen().is_empty());
}

#[tokio::test]
async fn notifier_failure_is_swallowed() {
    let f = fixture_with(RecordingNotifier { fail: true, ..RecordingNotifier::default() });
    let (_, c2) = open_c1(&f).await;
    let raw = f.api.deliver(c2, Uuid::new_v4(), "ring");

    f.router.handle_chat_message(decode_payload(&chat_frame(&raw))).await;

    assert_eq!(f.notifier.seen().len(), 1);
    assert_eq!(f.state.read().await.unread_count, 1);
}

#[tokio::test]
async fn message_with_attachment_summaries_keeps_metas() {
    let f = fixture();
    let (c1, _) = open_c1(&f).await;
    let raw = f.api.deliver(c1, Uuid::new_v4(), "pic");
    let mut frame = chat_frame(&raw);
    let file = Uuid::new_v4();
    frame.payload["attachments"] = serde_json::json!([{
        "id": file,
        "file_name": "a.png",
        "original_name": "cat.png",
        "content_type": "image/png",
        "file_size": 10,
        "file_category": "image",
        "url": "https://files.test/a.png"
    }]);

    f.router.handle_chat_message(decode_payload(&frame)).await;

    let state = f.state.read().await;
    let metas = state.messages.last().and_then(|m| m.attachment_metas.clone()).unwrap();
    assert_eq!(metas.len(), 1);
    assert_eq!(metas[0].id, file);
    assert_eq!(metas[0].uploader_id, raw.sender_id);
}

#[tokio::test]
async fn malformed_frame_is_dropped() {
    let f = fixture();
    let frame = Frame::new(EVENT_CHAT_MESSAGE, serde_json::json!({ "message_id": "nope" }));
    f.router.dispatch(&frame).await;
    assert!(f.api.calls().is_empty());
}

// =============================================================================
// typing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn typing_frame_reaches_tracker() {
    let f = fixture();
    let user = Uuid::new_v4();
    let conv = Uuid::new_v4();
    let frame = Frame::new(
        EVENT_TYPING_INDICATOR,
        serde_json::to_value(TypingPayload { user_id: user, conversation_id: conv, is_typing: true }).unwrap(),
    );

    f.router.dispatch(&frame).await;
    assert_eq!(f.router.typing.typing_in(conv), vec![user]);

    tokio::time::sleep(Duration::from_millis(3100)).await;
    assert!(f.router.typing.typing_in(conv).is_empty());
}

#[tokio::test]
async fn notify_typing_sends_outbound_frame() {
    let mut f = fixture();
    let conv = Uuid::new_v4();

    f.router.notify_typing(conv, true).unwrap();
    f.router.notify_typing(conv, false).unwrap();

    let first: serde_json::Value = serde_json::from_str(&f.outbound.try_recv().unwrap()).unwrap();
    let second: serde_json::Value = serde_json::from_str(&f.outbound.try_recv().unwrap()).unwrap();
    assert_eq!(first["type"], "typing_indicator");
    assert_eq!(first["payload"]["is_typing"], true);
    assert_eq!(second["payload"]["is_typing"], false);
    assert_eq!(second["payload"]["conversation_id"], conv.to_string());
}

#[tokio::test]
async fn notify_typing_on_closed_transport_errors() {
    let f = fixture();
    drop(f.outbound);
    assert_eq!(f.router.notify_typing(Uuid::new_v4(), true), Err(TransportError::Closed));
}

// =============================================================================
// bus wiring
// =============================================================================

#[tokio::test]
async fn spawned_tasks_consume_bus_frames() {
    let f = fixture();
    let (_, c2) = open_c1(&f).await;
    let bus = EventBus::new();
    let handles = f.router.spawn(&bus).unwrap();
    assert!(f.router.spawn(&bus).is_err());

    let raw = f.api.deliver(c2, Uuid::new_v4(), "via bus");
    assert!(bus.publish(chat_frame(&raw)));

    for _ in 0..100 {
        if f.state.read().await.unread_count == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(f.state.read().await.unread_count, 1);

    bus.close();
    for handle in handles {
        handle.await.unwrap();
    }
}
