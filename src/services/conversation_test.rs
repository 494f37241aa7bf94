use super::*;
use crate::model::Message;
use crate::state::SessionState;
use crate::state::test_helpers::{MockApi, base_time, conversation, participant, raw_message};
use time::Duration;

struct Fixture {
    api: Arc<MockApi>,
    state: SharedState,
    store: ConversationStore,
}

fn fixture(kind: Option<ConversationKind>) -> Fixture {
    let api = MockApi::new(Uuid::new_v4());
    let state = SessionState::shared();
    let unread = UnreadCounter::new(api.clone(), state.clone());
    let store = ConversationStore::new(api.clone(), state.clone(), unread, kind);
    Fixture { api, state, store }
}

fn ids(state: &SessionState) -> Vec<Uuid> {
    state.conversations.iter().map(|c| c.id).collect()
}

// =============================================================================
// merge_conversations
// =============================================================================

#[test]
fn merge_sorts_by_recency_desc() {
    let old = conversation(Uuid::new_v4(), false, base_time());
    let new = conversation(Uuid::new_v4(), true, base_time() + Duration::hours(1));
    let mid = conversation(Uuid::new_v4(), false, base_time() + Duration::minutes(30));

    let merged = merge_conversations(vec![vec![old.clone(), mid.clone()], vec![new.clone()]]);
    let got: Vec<Uuid> = merged.iter().map(|c| c.id).collect();
    assert_eq!(got, vec![new.id, mid.id, old.id]);
}

#[test]
fn merge_dedupes_with_later_entry_winning() {
    let id = Uuid::new_v4();
    let mut first = conversation(id, false, base_time());
    first.unread_count = 1;
    let mut second = conversation(id, false, base_time());
    second.unread_count = 7;

    let merged = merge_conversations(vec![vec![first], vec![second]]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].unread_count, 7);
}

// =============================================================================
// load
// =============================================================================

#[tokio::test]
async fn load_without_filter_fetches_both_kinds() {
    let f = fixture(None);
    let personal = Uuid::new_v4();
    let group = Uuid::new_v4();
    f.api.add_conversation(conversation(personal, false, base_time()));
    f.api.add_conversation(conversation(group, true, base_time() + Duration::minutes(5)));

    assert_eq!(f.store.load().await, Ok(2));
    assert_eq!(f.api.call_count("list_conversations"), 2);
    assert_eq!(ids(&*f.state.read().await), vec![group, personal]);
}

#[tokio::test]
async fn load_with_filter_fetches_one_kind() {
    let f = fixture(Some(ConversationKind::Group));
    f.api.add_conversation(conversation(Uuid::new_v4(), false, base_time()));
    let group = Uuid::new_v4();
    f.api.add_conversation(conversation(group, true, base_time()));

    assert_eq!(f.store.load().await, Ok(1));
    assert_eq!(f.api.call_count("list_conversations"), 1);
    assert!(f.store.contains(group).await);
}

#[tokio::test]
async fn loading_flag_only_covers_first_load() {
    let f = fixture(None);
    assert!(f.state.read().await.loading);

    f.api.fail("list_conversations", ApiError::Network("down".into()));
    assert!(f.store.load().await.is_err());
    assert!(f.state.read().await.loading);

    f.api.heal("list_conversations");
    f.store.load().await.unwrap();
    assert!(!f.state.read().await.loading);

    f.store.load().await.unwrap();
    assert!(!f.state.read().await.loading);
}

#[tokio::test]
async fn failed_load_keeps_cache() {
    let f = fixture(None);
    let id = Uuid::new_v4();
    f.api.add_conversation(conversation(id, false, base_time()));
    f.store.load().await.unwrap();

    f.api.fail("list_conversations", ApiError::Status { status: 500, body: String::new() });
    f.api.add_conversation(conversation(Uuid::new_v4(), false, base_time()));
    assert!(f.store.load().await.is_err());
    assert_eq!(ids(&*f.state.read().await), vec![id]);
}

// =============================================================================
// mutations
// =============================================================================

async fn open_with_messages(f: &Fixture, conversation_id: Uuid) {
    let mut state = f.state.write().await;
    state.active_conversation = Some(conversation_id);
    state.append_message(Message::from_raw(raw_message(conversation_id, Uuid::new_v4(), "x", base_time())));
}

#[tokio::test]
async fn leaving_active_group_closes_view() {
    let f = fixture(None);
    let group = Uuid::new_v4();
    f.api.add_conversation(conversation(group, true, base_time()));
    f.store.load().await.unwrap();
    open_with_messages(&f, group).await;

    f.store.leave_group(group).await.unwrap();

    let state = f.state.read().await;
    assert!(state.active_conversation.is_none());
    assert!(state.messages.is_empty());
    assert!(!state.contains_conversation(group));
    assert!(f.api.calls().contains(&"get_unread_count"));
}

#[tokio::test]
async fn archive_other_conversation_keeps_view() {
    let f = fixture(None);
    let open = Uuid::new_v4();
    let other = Uuid::new_v4();
    f.api.add_conversation(conversation(open, false, base_time()));
    f.api.add_conversation(conversation(other, false, base_time()));
    f.store.load().await.unwrap();
    open_with_messages(&f, open).await;

    f.store.archive(other).await.unwrap();

    let state = f.state.read().await;
    assert_eq!(state.active_conversation, Some(open));
    assert_eq!(state.messages.len(), 1);
    assert_eq!(ids(&state), vec![open]);
}

#[tokio::test]
async fn unarchive_restores_conversation() {
    let f = fixture(None);
    let id = Uuid::new_v4();
    f.api.add_conversation(conversation(id, false, base_time()));
    f.store.archive(id).await.unwrap();
    assert!(!f.store.contains(id).await);

    f.store.unarchive(id).await.unwrap();
    assert!(f.store.contains(id).await);
}

#[tokio::test]
async fn delete_failure_changes_nothing() {
    let f = fixture(None);
    let id = Uuid::new_v4();
    f.api.add_conversation(conversation(id, false, base_time()));
    f.store.load().await.unwrap();
    open_with_messages(&f, id).await;
    f.api.fail("delete_conversation", ApiError::Unauthorized { status: 403 });
    f.api.clear_calls();

    let err = f.store.delete(id).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized { status: 403 });
    assert_eq!(f.api.calls(), vec!["delete_conversation"]);
    let state = f.state.read().await;
    assert_eq!(state.active_conversation, Some(id));
    assert!(state.contains_conversation(id));
}

#[tokio::test]
async fn start_conversation_is_idempotent() {
    let f = fixture(None);
    let peer = Uuid::new_v4();

    let first = f.store.start_conversation(peer).await.unwrap();
    let second = f.store.start_conversation(peer).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(f.state.read().await.conversations.len(), 1);
}

#[tokio::test]
async fn create_group_then_manage_members() {
    let f = fixture(None);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let group = f.store.create_group("Ops", &[alice]).await.unwrap();
    assert!(f.store.get(group.id).await.is_some_and(|c| c.is_group));

    f.store.add_members(group.id, &[bob]).await.unwrap();
    f.store.remove_member(group.id, alice).await.unwrap();
    let members: Vec<Uuid> = f.store.group_members(group.id).await.unwrap().iter().map(|p| p.user_id).collect();
    assert!(members.contains(&bob));
    assert!(!members.contains(&alice));

    f.store.rename_group(group.id, "Ops on-call").await.unwrap();
    assert_eq!(f.store.get(group.id).await.and_then(|c| c.name), Some("Ops on-call".to_string()));
}

#[tokio::test]
async fn mutation_on_missing_conversation_reports_not_found() {
    let f = fixture(None);
    let err = f.store.rename_group(Uuid::new_v4(), "x").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn contacts_pass_through() {
    let f = fixture(None);
    let user = Uuid::new_v4();
    f.api.with(|s| s.contacts.push(participant(user, "dana")));
    let contacts = f.store.contacts().await.unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].username, "dana");
}
