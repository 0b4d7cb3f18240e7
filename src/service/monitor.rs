// src/service/monitor.rs

use crate::constants::ICON_PLACEHOLDER;
use crate::service::ListenerService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Periodic passive monitor: prints the live-connection count and a status
/// line per connection, and pushes the aggregate figures to hub clients.
pub fn start_connection_monitor(service: Arc<ListenerService>, interval: Duration) {
    println!(
        "{}Connection monitor started (interval: {:?})",
        ICON_PLACEHOLDER, interval
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let count = service.get_connection_count();
            println!(
                "{}[{}] connection monitor: {} active",
                ICON_PLACEHOLDER,
                Utc::now().to_rfc3339(),
                count
            );
            if count > 0 {
                log_connection_status(&service);
                service.broadcast_connection_status();
            }
        }
    });
}

/// One line per live connection: id, protocol, creation time.
pub fn log_connection_status(service: &ListenerService) {
    for conn in service.get_all_connections() {
        println!(
            "{}id={} protocol={} created={} agent={}",
            ICON_PLACEHOLDER,
            conn.id(),
            conn.protocol(),
            conn.created_at().to_rfc3339(),
            if conn.agent_uuid().is_empty() {
                "-".to_string()
            } else {
                conn.agent_uuid()
            }
        );
    }
}
