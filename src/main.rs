use clap::Parser;
use pyre::{
    config::Config,
    connections::ConnectionManager,
    constants::*,
    hub::{ServiceBridge, WsHub},
    listeners::{AbstractFactory, ListenerManager},
    registry::ConnectionRegistry,
    security::FileCertificateProvider,
    service::{monitor::start_connection_monitor, ListenerService},
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pyre listener fabric server")]
struct Args {
    /// Optional path to config file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the operator WebSocket port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the certificate directory
    #[arg(long)]
    certs_dir: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // rustls reads the process-wide provider; install it before any TLS
    // configuration is built.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config_path = args.config.clone().unwrap_or_else(|| "config.toml".to_string());
    let mut config = match fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str::<Config>(&content) {
            Ok(cfg) => {
                println!("{}Loaded config from: {}", ICON_PLACEHOLDER, config_path);
                cfg
            }
            Err(err) => {
                eprintln!("❌ Failed to parse config file '{}': {}", config_path, err);
                std::process::exit(1);
            }
        },
        Err(_) => {
            println!(
                "⚠️ No config file found at '{}', falling back to default config.",
                config_path
            );
            Config::default()
        }
    };
    if let Some(port) = args.ws_port {
        config.ws_port = Some(port);
    }
    if let Some(dir) = args.certs_dir {
        config.certs_dir = Some(dir);
    }
    if let Err(err) = config.validate() {
        eprintln!("❌ Invalid configuration: {}", err);
        std::process::exit(1);
    }

    // Initialize events AFTER config is loaded so custom logging path can be applied
    if let Some(log_cfg) = config.logging.as_ref() {
        pyre::events::init_events_from_config(Some(log_cfg)).await;
    } else {
        pyre::events::init_default_events().await;
    }

    let app_name = config.app_name.clone().unwrap_or_else(|| DEFAULT_APP_NAME.into());
    println!("{}{} v{} starting.", ICON_PLACEHOLDER, app_name, APP_VERSION);

    // Wire the late-bound process-wide pieces explicitly, leaves first:
    // registry -> connection manager -> hub -> factory -> service -> bridge.
    let registry = Arc::new(ConnectionRegistry::new());
    let connection_manager = ConnectionManager::new(registry.clone(), config.history_cap());
    registry.link_manager(connection_manager.clone());

    let hub = WsHub::new(config.ws_port(), registry.clone());
    connection_manager.attach_hub(hub.clone());
    {
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = hub.run().await {
                eprintln!("❌ WebSocket hub error: {}", e);
                std::process::exit(1);
            }
        });
    }
    println!(
        "{}Operator channel on ws://0.0.0.0:{}{}",
        ICON_PLACEHOLDER,
        config.ws_port(),
        WS_PATH
    );

    let cert_provider = match FileCertificateProvider::from_dir(config.certs_dir()) {
        Ok(provider) => Some(provider),
        Err(e) => {
            println!("⚠️ {}. TLS listeners will not be available.", e);
            None
        }
    };

    let factory = AbstractFactory::new(connection_manager.clone(), registry.clone(), cert_provider);
    let listener_manager = ListenerManager::new();
    let service = Arc::new(ListenerService::new(
        factory,
        listener_manager,
        connection_manager.clone(),
    ));
    service.attach_hub(hub.clone());
    hub.register_bridge(service.clone() as Arc<dyn ServiceBridge>);

    if let Some(monitor) = config.monitor.as_ref() {
        if monitor.enabled {
            let interval = Duration::from_secs(monitor.interval_secs.unwrap_or(30));
            start_connection_monitor(service.clone(), interval);
        }
    }

    // Bring up the listeners declared in config.
    if let Some(specs) = config.listeners.clone() {
        for spec in specs {
            match service
                .create_and_start_listener(spec.protocol, &spec.port, spec.id.as_deref())
                .await
            {
                Ok(listener) => println!(
                    "{}Listener ({}) serving on :{}, protocol {}",
                    ICON_PLACEHOLDER,
                    listener.id(),
                    listener.port(),
                    listener.protocol()
                ),
                Err(e) => eprintln!("❌ Failed to start listener on :{}: {}", spec.port, e),
            }
        }
    }
    println!(
        "{}Managing {} active listener(s).",
        ICON_PLACEHOLDER,
        service.listener_count()
    );

    wait_for_shutdown_signal().await;
    println!("\n{}Termination signal received, shutting down...", ICON_PLACEHOLDER);
    service.stop_all_listeners().await;
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
