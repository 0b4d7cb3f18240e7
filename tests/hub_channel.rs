use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pyre::connections::ConnectionManager;
use pyre::hub::{ServiceBridge, WsHub};
use pyre::listeners::{AbstractFactory, ListenerManager};
use pyre::registry::ConnectionRegistry;
use pyre::service::ListenerService;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

const HUB_PORT: u16 = 47820;

/// Full control-plane wiring: registry, manager, hub, factory, service,
/// bridge — the same order the server binary uses.
async fn start_stack(hub_port: u16) -> Arc<ListenerService> {
    let registry = Arc::new(ConnectionRegistry::new());
    let manager = ConnectionManager::new(registry.clone(), 64);
    registry.link_manager(manager.clone());

    let hub = WsHub::new(hub_port, registry.clone());
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

    // Give the hub a moment to bind before clients dial in.
    tokio::time::sleep(Duration::from_millis(100)).await;
    service
}

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_client(hub_port: u16) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/ws", hub_port))
        .await
        .expect("hub upgrade");
    ws
}

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
async fn greeting_snapshots_and_command_round_trips() {
    let _service = start_stack(HUB_PORT).await;
    let mut ws = connect_client(HUB_PORT).await;

    // On connect: welcome, then a listeners snapshot, then a connections
    // snapshot.
    let welcome = next_envelope(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    let listeners = next_envelope(&mut ws).await;
    assert_eq!(listeners["type"], "listeners_snapshot");
    assert_eq!(listeners["payload"].as_array().unwrap().len(), 0);
    let connections = next_envelope(&mut ws).await;
    assert_eq!(connections["type"], "connections_snapshot");

    // create_listener with string-coerced protocol and numeric port.
    let cmd = json!({
        "action": "create_listener",
        "payload": {"id": "ui-made", "protocol": "3", "port": 47821}
    });
    ws.send(Message::Text(cmd.to_string())).await.unwrap();
    let created = next_envelope(&mut ws).await;
    assert_eq!(created["type"], "listener_created");
    assert_eq!(created["payload"]["id"], "ui-made");
    assert_eq!(created["payload"]["port"], "47821");
    assert_eq!(created["payload"]["protocol"], "HTTP/2 Clear");

    // The snapshot reply reflects the new listener.
    ws.send(Message::Text(json!({"action": "get_listeners"}).to_string()))
        .await
        .unwrap();
    let snapshot = next_envelope(&mut ws).await;
    assert_eq!(snapshot["type"], "listeners_snapshot");
    let entries = snapshot["payload"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], "ui-made");

    // Port probe: bound port reads unavailable.
    ws.send(Message::Text(
        json!({"action": "check_port", "payload": {"port": "47821"}}).to_string(),
    ))
    .await
    .unwrap();
    let probe = next_envelope(&mut ws).await;
    assert_eq!(probe["type"], "port_check_result");
    assert_eq!(probe["payload"]["port"], "47821");
    assert_eq!(probe["payload"]["isAvailable"], false);

    // A second listener on the same port gets a targeted error naming it.
    ws.send(Message::Text(
        json!({"action": "create_listener", "payload": {"protocol": 1, "port": "47821"}})
            .to_string(),
    ))
    .await
    .unwrap();
    let refused = next_envelope(&mut ws).await;
    assert_eq!(refused["type"], "listener_creation_error");
    assert!(refused["payload"]["message"]
        .as_str()
        .unwrap()
        .contains("47821"));

    // Unknown protocol discriminators are a hard error, not a guess.
    ws.send(Message::Text(
        json!({"action": "create_listener", "payload": {"protocol": 9, "port": "47822"}})
            .to_string(),
    ))
    .await
    .unwrap();
    let invalid = next_envelope(&mut ws).await;
    assert_eq!(invalid["type"], "listener_creation_error");
    assert!(invalid["payload"]["message"]
        .as_str()
        .unwrap()
        .contains("9"));

    // Unknown actions are logged and ignored; the socket stays usable.
    ws.send(Message::Text(json!({"action": "reticulate"}).to_string()))
        .await
        .unwrap();

    // stop_listener broadcasts listener_stopped.
    ws.send(Message::Text(
        json!({"action": "stop_listener", "payload": {"id": "ui-made"}}).to_string(),
    ))
    .await
    .unwrap();
    let stopped = next_envelope(&mut ws).await;
    assert_eq!(stopped["type"], "listener_stopped");
    assert_eq!(stopped["payload"]["id"], "ui-made");

    ws.send(Message::Text(json!({"action": "get_listeners"}).to_string()))
        .await
        .unwrap();
    let empty = next_envelope(&mut ws).await;
    assert_eq!(empty["type"], "listeners_snapshot");
    assert_eq!(empty["payload"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn broadcasts_reach_every_client() {
    let service = start_stack(HUB_PORT + 10).await;
    let mut first = connect_client(HUB_PORT + 10).await;
    let mut second = connect_client(HUB_PORT + 10).await;

    // Drain the three greeting frames on both sockets.
    for ws in [&mut first, &mut second] {
        for _ in 0..3 {
            next_envelope(ws).await;
        }
    }

    service
        .create_and_start_listener(pyre::protocol::ProtocolKind::H1Clear, "47831", Some("beta"))
        .await
        .unwrap();

    for ws in [&mut first, &mut second] {
        let evt = next_envelope(ws).await;
        assert_eq!(evt["type"], "listener_created");
        assert_eq!(evt["payload"]["id"], "beta");
    }

    service.stop_all_listeners().await;
    for ws in [&mut first, &mut second] {
        let evt = next_envelope(ws).await;
        assert_eq!(evt["type"], "listener_stopped");
    }
}
