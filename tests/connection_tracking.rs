use std::sync::Arc;

use pyre::connections::{ConnectionManager, TrackedConnection};
use pyre::protocol::ProtocolKind;
use pyre::registry::ConnectionRegistry;

const UUID: &str = "33333333-3333-3333-3333-333333333333";

fn wired_pair() -> (Arc<ConnectionRegistry>, ConnectionManager) {
    let registry = Arc::new(ConnectionRegistry::new());
    let manager = ConnectionManager::new(registry.clone(), 64);
    registry.link_manager(manager.clone());
    (registry, manager)
}

#[tokio::test]
async fn live_set_reflects_add_and_remove() {
    let (_registry, manager) = wired_pair();

    let conn = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    manager.add(conn.clone());

    assert_eq!(manager.count(), 1);
    let fetched = manager.get(conn.id()).expect("connection is live");
    assert_eq!(fetched.id(), conn.id());
    assert!(manager.created_at(conn.id()).is_some());

    assert!(manager.remove(conn.id()));
    assert_eq!(manager.count(), 0);
    assert!(manager.get(conn.id()).is_none());

    // Second remove is a no-op.
    assert!(!manager.remove(conn.id()));
}

#[tokio::test]
async fn projections_by_protocol_and_agent() {
    let (registry, manager) = wired_pair();

    let h1 = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    let h2 = TrackedConnection::new_stream(ProtocolKind::H2Clear, "8888");
    registry.register_connection("10.1.1.1:1000", h1.id());
    manager.add(h1.clone());
    registry.register_connection("10.1.1.2:1000", h2.id());
    manager.add(h2.clone());

    registry.register_uuid("10.1.1.1:1000", UUID);

    assert_eq!(manager.by_protocol(ProtocolKind::H1Clear).len(), 1);
    assert_eq!(manager.by_protocol(ProtocolKind::H2Tls).len(), 0);
    assert_eq!(manager.by_agent_uuid(UUID).len(), 1);
    assert_eq!(manager.unique_agent_uuids(), vec![UUID.to_string()]);
    assert_eq!(manager.count_by_agent_uuid().get(UUID), Some(&1));
}

#[tokio::test]
async fn history_survives_close_and_detects_reconnects() {
    let (registry, manager) = wired_pair();

    let first = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    registry.register_connection("10.2.0.1:40001", first.id());
    manager.add(first.clone());
    registry.register_uuid("10.2.0.1:40001", UUID);

    assert!(!manager.is_reconnection(UUID));

    // First transport connection goes away; history must keep its entry.
    manager.remove(first.id());

    let second = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    registry.register_connection("10.2.0.1:40002", second.id());
    manager.add(second.clone());
    registry.register_uuid("10.2.0.1:40002", UUID);

    let history = manager.history_by_agent_uuid(UUID);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], first.id());
    assert_eq!(history[1], second.id());
    assert!(manager.is_reconnection(UUID));
}

#[tokio::test]
async fn history_is_bounded() {
    let registry = Arc::new(ConnectionRegistry::new());
    let manager = ConnectionManager::new(registry.clone(), 4);
    registry.link_manager(manager.clone());

    let mut ids = Vec::new();
    for i in 0..10 {
        let conn = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
        let addr = format!("10.3.0.1:{}", 41000 + i);
        registry.register_connection(&addr, conn.id());
        manager.add(conn.clone());
        registry.register_uuid(&addr, UUID);
        ids.push(conn.id().to_string());
        manager.remove(conn.id());
    }

    let history = manager.history_by_agent_uuid(UUID);
    assert_eq!(history.len(), 4);
    // Oldest entries were dropped from the front.
    assert_eq!(history, ids[6..].to_vec());
}
