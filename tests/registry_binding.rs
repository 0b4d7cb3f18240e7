use std::sync::Arc;

use pyre::connections::{ConnectionManager, TrackedConnection};
use pyre::protocol::ProtocolKind;
use pyre::registry::ConnectionRegistry;

const UUID_A: &str = "11111111-1111-1111-1111-111111111111";
const UUID_B: &str = "22222222-2222-2222-2222-222222222222";

fn wired_pair() -> (Arc<ConnectionRegistry>, ConnectionManager) {
    let registry = Arc::new(ConnectionRegistry::new());
    let manager = ConnectionManager::new(registry.clone(), 64);
    registry.link_manager(manager.clone());
    (registry, manager)
}

#[tokio::test]
async fn uuid_binds_to_the_connection_behind_a_remote_addr() {
    let (registry, manager) = wired_pair();

    let conn = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    registry.register_connection("10.0.0.5:50123", conn.id());
    manager.add(conn.clone());

    registry.register_uuid("10.0.0.5:50123", UUID_A);

    assert_eq!(conn.agent_uuid(), UUID_A);
    assert_eq!(
        registry.agent_uuid_by_conn_id(conn.id()).as_deref(),
        Some(UUID_A)
    );
    assert_eq!(
        registry.remote_addr_by_conn_id(conn.id()).as_deref(),
        Some("10.0.0.5:50123")
    );
}

#[tokio::test]
async fn repeated_register_uuid_calls_update_the_manager_once() {
    let (registry, manager) = wired_pair();

    let conn = TrackedConnection::new_stream(ProtocolKind::H2Clear, "8888");
    registry.register_connection("10.0.0.9:40000", conn.id());
    manager.add(conn.clone());

    for _ in 0..5 {
        registry.register_uuid("10.0.0.9:40000", UUID_A);
    }

    // The dedup set suppressed the redundant calls: one history entry only.
    assert_eq!(manager.history_by_agent_uuid(UUID_A), vec![conn.id().to_string()]);
    assert!(!manager.is_reconnection(UUID_A));
}

#[tokio::test]
async fn remote_addr_mapping_is_overwritten_on_reuse() {
    let (registry, manager) = wired_pair();

    let first = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    registry.register_connection("10.0.0.2:51000", first.id());
    manager.add(first.clone());

    // Kernel recycles the port; a new connection claims the same tuple.
    let second = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    registry.register_connection("10.0.0.2:51000", second.id());
    manager.add(second.clone());

    registry.register_uuid("10.0.0.2:51000", UUID_B);
    assert_eq!(second.agent_uuid(), UUID_B);
    assert_eq!(first.agent_uuid(), "");
}

#[tokio::test]
async fn conflicting_uuid_is_ignored_and_the_first_binding_stays() {
    let (registry, manager) = wired_pair();

    let conn = TrackedConnection::new_stream(ProtocolKind::H1Clear, "7777");
    registry.register_connection("10.0.0.3:52000", conn.id());
    manager.add(conn.clone());

    registry.register_uuid("10.0.0.3:52000", UUID_A);
    registry.register_uuid("10.0.0.3:52000", UUID_B);

    assert_eq!(conn.agent_uuid(), UUID_A);
    assert_eq!(
        registry.agent_uuid_by_conn_id(conn.id()).as_deref(),
        Some(UUID_A)
    );
    assert!(manager.history_by_agent_uuid(UUID_B).is_empty());
}

#[tokio::test]
async fn unknown_remote_addr_is_a_silent_noop() {
    let (registry, manager) = wired_pair();
    registry.register_uuid("192.0.2.1:9", UUID_A);
    assert!(manager.history_by_agent_uuid(UUID_A).is_empty());
}
