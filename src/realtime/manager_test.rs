use super::*;
use crate::chat::types::GroupMembership;
use crate::kanban::types::CategoryRow;
use crate::realtime::transport::MemoryHub;
use crate::test_helpers::{
    MockBackend, RecordingNotifier, board_row, card, category_row, delete_broadcast, eventually, row_broadcast, signed_in,
};
use frames::Operation;
use serde_json::json;

struct Harness {
    hub: Arc<MemoryHub>,
    backend: Arc<MockBackend>,
    notifier: Arc<RecordingNotifier>,
    kanban: Arc<KanbanStore>,
    manager: Arc<RealtimeManager>,
}

fn harness() -> Harness {
    let hub = Arc::new(MemoryHub::new(16));
    let backend = MockBackend::new();
    let notifier = Arc::new(RecordingNotifier::default());
    let chat = Arc::new(ChatStore::new(backend.clone(), notifier.clone(), signed_in("u1")));
    let kanban = Arc::new(KanbanStore::new(backend.clone(), notifier.clone(), signed_in("u1")));
    let manager = RealtimeManager::new(hub.clone(), backend.clone(), chat, kanban.clone(), notifier.clone());
    Harness { hub, backend, notifier, kanban, manager }
}

fn membership(group_id: &str, user_id: &str) -> GroupMembership {
    GroupMembership { group_id: group_id.into(), user_id: user_id.into() }
}

#[test]
fn channel_names() {
    let direct = ChannelKey::Direct { org_id: "o".into(), user_id: "u".into() };
    assert_eq!(direct.to_string(), "chat-direct:o:u");
    assert_eq!(ChannelKey::Group("g".into()).to_string(), "chat-group:g");
    let names: Vec<String> = ChannelKey::board_channels("b").iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["kanban-board:b", "kanban-cat:b", "kanban-cards:b", "kanban-members:b"]);
    assert!(direct.is_chat());
    assert!(!ChannelKey::Cards("b".into()).is_chat());
}

#[tokio::test]
async fn initialize_chat_opens_direct_membership_and_group_channels_once() {
    let h = harness();
    h.backend.groups.lock().unwrap().insert(("orgA".into(), "u1".into()), vec!["g1".into(), "g2".into()]);

    h.manager.initialize_chat("orgA", "u1").await;
    h.manager.initialize_chat("orgA", "u1").await;

    assert_eq!(
        h.manager.channels().await,
        vec!["chat-direct:orgA:u1", "chat-membership:orgA:u1", "chat-group:g1", "chat-group:g2"]
    );
    assert_eq!(h.backend.calls("group_ids"), 1);
    assert_eq!(h.hub.channels().len(), 4);
}

#[tokio::test]
async fn scope_change_closes_chat_and_board_channels_of_the_old_scope() {
    let h = harness();
    h.backend.groups.lock().unwrap().insert(("orgA".into(), "u1".into()), vec!["g1".into()]);
    h.manager.initialize_chat("orgA", "u1").await;
    h.manager.open_board("b1", "u1").await;

    h.manager.initialize_chat("orgB", "u1").await;

    assert_eq!(h.manager.channels().await, vec!["chat-direct:orgB:u1", "chat-membership:orgB:u1"]);
    let open = h.hub.channels();
    assert!(!open.iter().any(|c| c.contains("orgA") || c == "chat-group:g1"));
    assert!(!open.iter().any(|c| c.starts_with("kanban-")));
    assert_eq!(h.manager.chat_scope().await.map(|s| s.org_id), Some("orgB".into()));
}

#[tokio::test]
async fn board_opened_before_first_chat_scope_stays_open() {
    let h = harness();
    h.manager.open_board("b1", "u1").await;
    h.manager.initialize_chat("orgA", "u1").await;
    assert!(h.hub.channels().contains(&"kanban-cards:b1".to_string()));
}

#[tokio::test]
async fn membership_events_follow_the_current_user() {
    let h = harness();
    h.manager.initialize_chat("orgA", "u1").await;
    let channel = "chat-membership:orgA:u1";

    h.hub.publish(&row_broadcast(channel, Operation::Insert, "chat_group_members", &membership("g7", "u2")));
    h.hub.publish(&row_broadcast(channel, Operation::Insert, "chat_group_members", &membership("g9", "u1")));
    eventually(|| h.hub.channels().contains(&"chat-group:g9".to_string())).await;
    assert!(!h.hub.channels().contains(&"chat-group:g7".to_string()));

    h.hub.publish(&delete_broadcast(channel, "chat_group_members", json!({"group_id": "g9", "user_id": "u1"})));
    eventually(|| !h.hub.channels().contains(&"chat-group:g9".to_string())).await;
}

#[tokio::test]
async fn board_events_reach_the_kanban_cache() {
    let h = harness();
    h.backend.seed_board(board_row("b1", "orgA"), vec![category_row("A", "b1", 0)], vec![], vec![]);
    h.kanban.fetch_board("b1", false).await.unwrap();
    h.manager.open_board("b1", "u1").await;

    h.hub.publish_raw("kanban-cards:b1", vec![0xff, 0x00, 0x13]);
    h.hub.publish(&row_broadcast("kanban-cards:b1", Operation::Insert, "kanban_cards", &card("c1", "b1", "A", 1)));
    let renamed = CategoryRow { name: "Todo".into(), ..category_row("A", "b1", 0) };
    h.hub.publish(&row_broadcast("kanban-cat:b1", Operation::Update, "kanban_categories", &renamed));

    eventually(|| {
        h.kanban
            .board("b1")
            .and_then(|b| b.category("A").map(|c| c.name == "Todo" && c.cards.len() == 1))
            .unwrap_or(false)
    })
    .await;
}

#[tokio::test]
async fn closed_board_receives_nothing() {
    let h = harness();
    h.backend.seed_board(board_row("b1", "orgA"), vec![category_row("A", "b1", 0)], vec![], vec![]);
    h.kanban.fetch_board("b1", false).await.unwrap();
    h.manager.open_board("b1", "u1").await;
    h.manager.close_board("b1").await;

    let delivered =
        h.hub.publish(&row_broadcast("kanban-cards:b1", Operation::Insert, "kanban_cards", &card("c1", "b1", "A", 1)));
    assert_eq!(delivered, 0);
    assert!(h.manager.channels().await.is_empty());
    assert!(h.kanban.board("b1").unwrap().category("A").unwrap().cards.is_empty());
}

#[tokio::test]
async fn subscribe_failures_are_captured_not_returned() {
    let h = harness();
    h.hub.close();
    h.backend.fail("group_ids");

    h.manager.initialize_chat("orgA", "u1").await;

    assert!(h.manager.channels().await.is_empty());
    assert_eq!(
        h.notifier.capture_contexts(),
        vec!["realtime_subscribe", "realtime_subscribe", "chat_group_members"]
    );
}

#[tokio::test]
async fn shutdown_closes_everything() {
    let h = harness();
    h.manager.initialize_chat("orgA", "u1").await;
    h.manager.open_board("b1", "u1").await;

    h.manager.shutdown().await;

    assert!(h.hub.channels().is_empty());
    assert!(h.manager.chat_scope().await.is_none());
}
