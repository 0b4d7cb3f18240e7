use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// pyre-ctl: operator CLI for a running Pyre server.
///
/// Talks to the WebSocket control channel the UI uses, so everything the UI
/// can do is scriptable from a shell.
#[derive(Parser, Debug)]
#[command(
    name = "pyre-ctl",
    version,
    about = "Operator CLI for the Pyre control channel"
)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Control channel port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List live listeners
    Listeners,
    /// List live tracked connections
    Connections,
    /// Create and start a listener
    CreateListener {
        /// Optional human-memorable listener ID
        #[arg(long)]
        id: Option<String>,
        /// Protocol discriminator: 1=H1C 2=H1TLS 3=H2C 4=H2TLS 5=H3
        #[arg(long)]
        protocol: u8,
        /// Port to bind
        #[arg(long)]
        port: String,
    },
    /// Stop a listener by ID
    StopListener { id: String },
    /// Stop a tracked connection by ID
    StopConnection { id: String },
    /// Probe whether a port is free (advisory)
    CheckPort { port: String },
}

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn next_envelope(ws: &mut Ws) -> anyhow::Result<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for a server reply"))?
            .ok_or_else(|| anyhow::anyhow!("server closed the control channel"))?;
        if let Message::Text(text) = frame? {
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

/// Read frames until one with the wanted type tag arrives.
async fn wait_for(ws: &mut Ws, wanted: &[&str]) -> anyhow::Result<Value> {
    loop {
        let envelope = next_envelope(ws).await?;
        if wanted.iter().any(|t| envelope["type"] == *t) {
            return Ok(envelope);
        }
    }
}

fn print_listeners(payload: &Value) {
    let entries = payload.as_array().cloned().unwrap_or_default();
    if entries.is_empty() {
        println!("<none>");
        return;
    }
    for entry in entries {
        println!(
            "{}  :{}  {}  created {}",
            entry["id"].as_str().unwrap_or("?"),
            entry["port"].as_str().unwrap_or("?"),
            entry["protocol"].as_str().unwrap_or("?"),
            entry["createdAt"].as_str().unwrap_or("?"),
        );
    }
}

fn print_connections(payload: &Value) {
    let entries = payload.as_array().cloned().unwrap_or_default();
    if entries.is_empty() {
        println!("<none>");
        return;
    }
    for entry in entries {
        let agent = entry["agentUUID"].as_str().unwrap_or("");
        println!(
            "{}  :{}  {}  {}  agent {}",
            entry["id"].as_str().unwrap_or("?"),
            entry["port"].as_str().unwrap_or("?"),
            entry["protocol"].as_str().unwrap_or("?"),
            entry["remoteAddr"].as_str().unwrap_or("?"),
            if agent.is_empty() { "-" } else { agent },
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let url = format!("ws://{}:{}/ws", cli.host, cli.port);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| anyhow::anyhow!("failed to reach {}: {}", url, e))?;

    // Drain the greeting (welcome plus the two snapshots).
    for _ in 0..3 {
        next_envelope(&mut ws).await?;
    }

    match cli.command {
        Commands::Listeners => {
            ws.send(Message::Text(json!({"action": "get_listeners"}).to_string()))
                .await?;
            let reply = wait_for(&mut ws, &["listeners_snapshot"]).await?;
            print_listeners(&reply["payload"]);
        }
        Commands::Connections => {
            ws.send(Message::Text(json!({"action": "get_connections"}).to_string()))
                .await?;
            let reply = wait_for(&mut ws, &["connections_snapshot"]).await?;
            print_connections(&reply["payload"]);
        }
        Commands::CreateListener { id, protocol, port } => {
            let cmd = json!({
                "action": "create_listener",
                "payload": {"id": id, "protocol": protocol, "port": port}
            });
            ws.send(Message::Text(cmd.to_string())).await?;
            let reply =
                wait_for(&mut ws, &["listener_created", "listener_creation_error"]).await?;
            if reply["type"] == "listener_created" {
                println!(
                    "created {} on :{} ({})",
                    reply["payload"]["id"].as_str().unwrap_or("?"),
                    reply["payload"]["port"].as_str().unwrap_or("?"),
                    reply["payload"]["protocol"].as_str().unwrap_or("?"),
                );
            } else {
                eprintln!(
                    "❌ {}",
                    reply["payload"]["message"].as_str().unwrap_or("creation failed")
                );
                std::process::exit(1);
            }
        }
        Commands::StopListener { id } => {
            let cmd = json!({"action": "stop_listener", "payload": {"id": id}});
            ws.send(Message::Text(cmd.to_string())).await?;
            match wait_for(&mut ws, &["listener_stopped"]).await {
                Ok(reply) => println!(
                    "stopped {}",
                    reply["payload"]["id"].as_str().unwrap_or("?")
                ),
                Err(e) => {
                    eprintln!("❌ no listener_stopped observed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::StopConnection { id } => {
            let cmd = json!({"action": "stop_connection", "payload": {"id": id}});
            ws.send(Message::Text(cmd.to_string())).await?;
            // A repeat stop is a server-side no-op with no event; treat the
            // quiet case as already stopped.
            match wait_for(&mut ws, &["connection_stopped"]).await {
                Ok(reply) => println!(
                    "stopped {}",
                    reply["payload"]["id"].as_str().unwrap_or("?")
                ),
                Err(_) => println!("no event observed (already stopped?)"),
            }
        }
        Commands::CheckPort { port } => {
            let cmd = json!({"action": "check_port", "payload": {"port": port}});
            ws.send(Message::Text(cmd.to_string())).await?;
            let reply = wait_for(&mut ws, &["port_check_result"]).await?;
            let available = reply["payload"]["isAvailable"].as_bool().unwrap_or(false);
            println!(
                "port {} is {}",
                reply["payload"]["port"].as_str().unwrap_or("?"),
                if available { "available" } else { "in use" }
            );
        }
    }

    ws.close(None).await.ok();
    Ok(())
}
