use std::sync::Arc;
use std::time::Duration;

use pyre::connections::ConnectionManager;
use pyre::listeners::{AbstractFactory, ListenerManager};
use pyre::protocol::ProtocolKind;
use pyre::registry::ConnectionRegistry;
use pyre::service::ListenerService;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const UUID: &str = "11111111-1111-1111-1111-111111111111";

fn build_service() -> (Arc<ListenerService>, ConnectionManager) {
    let registry = Arc::new(ConnectionRegistry::new());
    let manager = ConnectionManager::new(registry.clone(), 64);
    registry.link_manager(manager.clone());
    let factory = AbstractFactory::new(manager.clone(), registry, None);
    let service = Arc::new(ListenerService::new(
        factory,
        ListenerManager::new(),
        manager.clone(),
    ));
    (service, manager)
}

async fn send_request(port: u16, uuid: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("connect to listener");
    let request = format!(
        "GET / HTTP/1.1\r\nHost: localhost\r\nX-Agent-UUID: {}\r\nConnection: keep-alive\r\n\r\n",
        uuid
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    // Read until the response headers are complete.
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = tokio::time::timeout_at(deadline, stream.read(&mut chunk))
            .await
            .expect("response before deadline")
            .expect("read response");
        assert!(n > 0, "server closed before responding");
        buf.extend_from_slice(&chunk[..n]);
    }
    (stream, String::from_utf8_lossy(&buf).to_string())
}

#[tokio::test]
async fn h1c_agent_handshake_populates_the_inventory() {
    let (service, manager) = build_service();
    let listener = service
        .create_and_start_listener(ProtocolKind::H1Clear, "47711", Some("alpha"))
        .await
        .expect("listener starts");
    assert_eq!(listener.id(), "alpha");
    assert!(listener.is_running());

    let (client, response) = send_request(47711, UUID).await;
    assert!(response.starts_with("HTTP/1.1 200"));

    assert_eq!(service.get_connection_count(), 1);
    let conn = &service.get_all_connections()[0];
    assert_eq!(conn.protocol(), ProtocolKind::H1Clear);
    assert_eq!(conn.port(), "47711");
    assert_eq!(conn.agent_uuid(), UUID);

    let info = manager.connection_info(conn);
    assert_eq!(info.protocol, "HTTP/1.1 Clear");
    assert_eq!(info.port, "47711");
    assert_eq!(info.agent_uuid, UUID);
    assert_ne!(info.remote_addr, "Unknown");

    // Peer goes away; the record must leave the live set.
    drop(client);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(service.get_connection_count(), 0);

    service.stop_listener("alpha").await.unwrap();
}

#[tokio::test]
async fn reconnect_detection_spans_closed_connections() {
    let (service, manager) = build_service();
    service
        .create_and_start_listener(ProtocolKind::H1Clear, "47712", None)
        .await
        .unwrap();

    let (first, _) = send_request(47712, UUID).await;
    drop(first);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let (_second, _) = send_request(47712, UUID).await;

    assert!(manager.is_reconnection(UUID));
    assert!(manager.history_by_agent_uuid(UUID).len() >= 2);

    service.stop_all_listeners().await;
}

#[tokio::test]
async fn stop_connection_is_idempotent() {
    let (service, _manager) = build_service();
    service
        .create_and_start_listener(ProtocolKind::H1Clear, "47713", None)
        .await
        .unwrap();

    let (mut client, _) = send_request(47713, UUID).await;
    let conn_id = service.get_all_connections()[0].id().to_string();

    service.stop_connection(&conn_id).await.unwrap();
    service.stop_connection(&conn_id).await.unwrap();
    assert_eq!(service.get_connection_count(), 0);

    // The transport really closed: the client observes EOF.
    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(3), client.read(&mut buf))
        .await
        .expect("read after close")
        .unwrap_or(0);
    assert_eq!(n, 0);

    service.stop_all_listeners().await;
}

#[tokio::test]
async fn port_in_use_is_refused_with_the_port_in_the_message() {
    let (service, _manager) = build_service();
    service
        .create_and_start_listener(ProtocolKind::H1Clear, "47714", None)
        .await
        .unwrap();

    assert!(!service.is_port_available("47714").await);

    let err = service
        .create_and_start_listener(ProtocolKind::H2Clear, "47714", None)
        .await
        .expect_err("second bind must fail");
    assert!(err.to_string().contains("47714"));
    // The failed listener was retracted from the inventory.
    assert_eq!(service.get_all_listeners().len(), 1);

    service.stop_all_listeners().await;
    assert!(service.is_port_available("47714").await);
    assert!(service.get_all_listeners().is_empty());
}

#[tokio::test]
async fn tls_listener_without_certificates_is_refused() {
    let (service, _manager) = build_service();
    let err = service
        .create_and_start_listener(ProtocolKind::H1Tls, "47715", None)
        .await
        .expect_err("TLS unavailable");
    assert!(err.to_string().contains("TLS unavailable"));
    assert!(service.get_all_listeners().is_empty());
}

#[tokio::test]
async fn stop_with_idle_connection_finishes_well_inside_the_deadline() {
    let (service, _manager) = build_service();
    service
        .create_and_start_listener(ProtocolKind::H1Clear, "47716", Some("drainer"))
        .await
        .unwrap();

    // Idle keep-alive connection held open across the stop.
    let (_client, _) = send_request(47716, UUID).await;

    let started = tokio::time::Instant::now();
    service.stop_listener("drainer").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let err = service.stop_listener("drainer").await.expect_err("gone");
    assert!(err.to_string().contains("drainer"));
}

#[tokio::test]
async fn stopped_listener_rejects_a_second_stop() {
    let (service, _manager) = build_service();
    let listener = service
        .create_and_start_listener(ProtocolKind::H2Clear, "47717", None)
        .await
        .unwrap();

    listener.stop().await.unwrap();
    let err = listener.stop().await.expect_err("server not started");
    assert_eq!(err.to_string(), "server not started");

    let _ = service.stop_all_listeners().await;
}
