use crate::constants::{DEFAULT_CERTS_DIR, DEFAULT_HISTORY_CAP, DEFAULT_WS_PORT};
use crate::error::Error;
use crate::protocol::ProtocolKind;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port for the operator WebSocket server (default 8080)
    pub ws_port: Option<u16>,
    /// Directory holding `server.crt` / `server.key`
    pub certs_dir: Option<String>,
    /// Listeners started at boot
    pub listeners: Option<Vec<ListenerSpec>>,
    /// Logging / events configuration
    pub logging: Option<LoggingConfig>,
    /// Periodic connection status reporting (optional)
    pub monitor: Option<MonitorConfig>,
    /// Cap on per-agent connection history entries
    pub history_cap: Option<usize>,
    pub app_name: Option<String>,
}

/// One listener to bring up at boot. The ID is optional; the factory mints
/// one when it is absent.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerSpec {
    pub id: Option<String>,
    pub port: String,
    pub protocol: ProtocolKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Path to JSON line audit log (rotated). If unset, defaults to logs/fabric_audit.jsonl
    pub json_path: Option<String>,
    /// Max size in bytes before rotation (default 5MB)
    pub json_max_bytes: Option<usize>,
    /// Number of rotated files to retain (default 3)
    pub json_rotate: Option<u32>,
    /// Disable console sink (default false)
    pub disable_console: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Seconds between status reports (default 30)
    pub interval_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_port: Some(DEFAULT_WS_PORT),
            certs_dir: Some(DEFAULT_CERTS_DIR.to_string()),
            listeners: None,
            logging: None,
            monitor: None,
            history_cap: Some(DEFAULT_HISTORY_CAP),
            app_name: None,
        }
    }
}

impl Config {
    pub fn ws_port(&self) -> u16 {
        self.ws_port.unwrap_or(DEFAULT_WS_PORT)
    }

    pub fn certs_dir(&self) -> &str {
        self.certs_dir.as_deref().unwrap_or(DEFAULT_CERTS_DIR)
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap.unwrap_or(DEFAULT_HISTORY_CAP)
    }

    /// Validate startup configuration. Failures here terminate the process
    /// with a non-zero exit code before anything binds.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(specs) = &self.listeners {
            for spec in specs {
                if spec.port.trim().is_empty() {
                    return Err(Error::Config("listener port must not be empty".into()));
                }
                if spec.port.parse::<u16>().is_err() {
                    return Err(Error::Config(format!(
                        "listener port '{}' is not a valid decimal port",
                        spec.port
                    )));
                }
                if let Some(id) = &spec.id {
                    if id.trim().is_empty() {
                        return Err(Error::Config("listener id must not be empty".into()));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_listener_specs_from_toml() {
        let cfg: Config = toml::from_str(
            r#"
            ws_port = 9090

            [[listeners]]
            id = "alpha"
            port = "7777"
            protocol = "h1c"

            [[listeners]]
            port = "8888"
            protocol = "h2c"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ws_port(), 9090);
        let specs = cfg.listeners.as_ref().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].protocol, ProtocolKind::H1Clear);
        assert!(specs[1].id.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_ports() {
        let cfg: Config = toml::from_str(
            r#"
            [[listeners]]
            port = "notaport"
            protocol = "h1c"
            "#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
