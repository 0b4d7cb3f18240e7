use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pyre::connections::ConnectionManager;
use pyre::hub::{ServiceBridge, WsHub};
use pyre::listeners::{AbstractFactory, ListenerManager};
use pyre::protocol::ProtocolKind;
use pyre::registry::ConnectionRegistry;
use pyre::service::ListenerService;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;

const HUB_PORT: u16 = 47840;
const AGENT_PORT: u16 = 47841;
const UUID: &str = "44444444-4444-4444-4444-444444444444";

async fn start_stack() -> Arc<ListenerService> {
    let registry = Arc::new(ConnectionRegistry::new());
    let manager = ConnectionManager::new(registry.clone(), 64);
    registry.link_manager(manager.clone());

    let hub = WsHub::new(HUB_PORT, registry.clone());
    manager.attach_hub(hub.clone());
    {
        let hub = hub.clone();
        tokio::spawn(async move {
            let _ = hub.run().await;
        });
    }

    let factory = AbstractFactory::new(manager.clone(), registry, None);
    let service = Arc::new(ListenerService::new(
        factory,
        ListenerManager::new(),
        manager,
    ));
    service.attach_hub(hub.clone());
    hub.register_bridge(service.clone() as Arc<dyn ServiceBridge>);
    tokio::time::sleep(Duration::from_millis(100)).await;
    service
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_envelope(ws: &mut WsClient) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame before deadline")
            .expect("stream open")
            .expect("frame decodes");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("frame is JSON");
        }
    }
}

#[tokio::test]
async fn connection_lifecycle_is_observable_from_the_hub() {
    let service = start_stack().await;
    service
        .create_and_start_listener(ProtocolKind::H1Clear, &AGENT_PORT.to_string(), Some("gamma"))
        .await
        .unwrap();

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/ws", HUB_PORT))
        .await
        .expect("hub upgrade");
    for _ in 0..3 {
        next_envelope(&mut ws).await;
    }

    // Agent dials in: connection_created precedes any served request.
    let mut agent = TcpStream::connect(("127.0.0.1", AGENT_PORT)).await.unwrap();
    let created = next_envelope(&mut ws).await;
    assert_eq!(created["type"], "connection_created");
    assert_eq!(created["payload"]["port"], AGENT_PORT.to_string());
    assert_eq!(created["payload"]["protocol"], "HTTP/1.1 Clear");
    // The UUID has not been observed yet at accept time.
    assert_eq!(created["payload"]["agentUUID"], "");
    let conn_id = created["payload"]["id"].as_str().unwrap().to_string();

    let request = format!(
        "GET / HTTP/1.1\r\nHost: localhost\r\nx-agent-uuid: {}\r\nConnection: keep-alive\r\n\r\n",
        UUID
    );
    agent.write_all(request.as_bytes()).await.unwrap();
    let mut buf = [0u8; 512];
    let n = agent.read(&mut buf).await.unwrap();
    assert!(n > 0);

    // The snapshot carries the late-bound UUID; no second connection_created
    // was emitted for it.
    ws.send(Message::Text(json!({"action": "get_connections"}).to_string()))
        .await
        .unwrap();
    let snapshot = next_envelope(&mut ws).await;
    assert_eq!(snapshot["type"], "connections_snapshot");
    let entries = snapshot["payload"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], conn_id.as_str());
    assert_eq!(entries[0]["agentUUID"], UUID);
    assert_ne!(entries[0]["remoteAddr"], "Unknown");

    let stats = service.get_connection_stats();
    assert_eq!(stats.total_connections, 1);
    assert_eq!(
        stats.connections_by_protocol.get(&ProtocolKind::H1Clear),
        Some(&1)
    );
    assert!(stats.average_age_seconds >= 0.0);

    // stop_connection over the control channel: exactly one
    // connection_stopped even though the command is sent twice.
    for _ in 0..2 {
        ws.send(Message::Text(
            json!({"action": "stop_connection", "payload": {"id": conn_id}}).to_string(),
        ))
        .await
        .unwrap();
    }
    let stopped = next_envelope(&mut ws).await;
    assert_eq!(stopped["type"], "connection_stopped");
    assert_eq!(stopped["payload"]["id"], conn_id.as_str());

    ws.send(Message::Text(json!({"action": "get_connections"}).to_string()))
        .await
        .unwrap();
    let empty = next_envelope(&mut ws).await;
    assert_eq!(empty["type"], "connections_snapshot");
    assert_eq!(empty["payload"].as_array().unwrap().len(), 0);

    service.stop_all_listeners().await;
}
