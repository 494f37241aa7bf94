use super::*;
use crate::state::SessionState;
use crate::state::test_helpers::{MockApi, base_time, conversation};
use uuid::Uuid;

fn setup() -> (Arc<MockApi>, UnreadCounter) {
    let api = MockApi::new(Uuid::new_v4());
    let counter = UnreadCounter::new(api.clone(), SessionState::shared());
    (api, counter)
}

#[tokio::test]
async fn refresh_takes_server_total() {
    let (api, counter) = setup();
    let conv = Uuid::new_v4();
    api.add_conversation(conversation(conv, false, base_time()));
    api.deliver(conv, Uuid::new_v4(), "one");
    api.deliver(conv, Uuid::new_v4(), "two");

    assert_eq!(counter.refresh().await, Ok(2));
    assert_eq!(counter.count().await, 2);
}

#[tokio::test]
async fn failed_refresh_keeps_last_value() {
    let (api, counter) = setup();
    let conv = Uuid::new_v4();
    api.add_conversation(conversation(conv, false, base_time()));
    api.deliver(conv, Uuid::new_v4(), "one");
    counter.refresh().await.unwrap();

    api.fail("get_unread_count", ApiError::Status { status: 503, body: String::new() });
    api.deliver(conv, Uuid::new_v4(), "two");
    assert!(counter.refresh().await.is_err());
    assert_eq!(counter.count().await, 1);

    counter.refresh_logged().await;
    assert_eq!(counter.count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn poll_task_refreshes_on_interval() {
    let (api, counter) = setup();
    let conv = Uuid::new_v4();
    api.add_conversation(conversation(conv, false, base_time()));

    let handle = counter.spawn_poll_task(Duration::from_secs(60)).unwrap();
    tokio::task::yield_now().await;
    assert_eq!(api.call_count("get_unread_count"), 0);

    api.deliver(conv, Uuid::new_v4(), "ping");
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(api.call_count("get_unread_count"), 1);
    assert_eq!(counter.count().await, 1);

    handle.abort();
}

#[test]
fn zero_interval_disables_poll() {
    let (_api, counter) = setup();
    assert!(counter.spawn_poll_task(Duration::ZERO).is_none());
}
