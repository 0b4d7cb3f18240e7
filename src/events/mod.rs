pub mod dispatcher;
pub mod init;
pub mod model;
pub mod sink;

pub use dispatcher::*;
pub use init::*;
pub use model::*;
pub use sink::*;

use model::{LogEvent, LogLevel, NetworkEvent};

/// Emit a structured network event with optional console output suppression.
pub(crate) fn emit_network_event(
    component: &'static str,
    level: LogLevel,
    action: &str,
    addr: Option<String>,
    detail: Option<String>,
) {
    let mut meta = dispatcher::meta(component, level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Network(NetworkEvent {
        meta,
        action: action.to_string(),
        addr,
        detail,
    }));
}

/// Emit a structured connection lifecycle event.
pub(crate) fn emit_connection_event(
    level: LogLevel,
    action: &str,
    conn_id: &str,
    detail: Option<String>,
) {
    let mut meta = dispatcher::meta("connection", level);
    meta.corr_id = Some(dispatcher::correlation_id());
    dispatcher::emit(LogEvent::Connection(model::ConnectionEvent {
        meta,
        action: action.to_string(),
        conn_id: conn_id.to_string(),
        detail,
    }));
}

/// Emit a structured hub (control channel) event.
pub(crate) fn emit_hub_event(level: LogLevel, action: &str, detail: Option<String>) {
    let meta = dispatcher::meta("hub", level);
    dispatcher::emit(LogEvent::Hub(model::HubEvent {
        meta,
        action: action.to_string(),
        detail,
    }));
}
