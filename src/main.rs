//! GlobalDorm client - console entry point
//!
//! Initializes:
//! - Configuration ([`ConfigManager`]) from `GlobalDorm Data/`
//! - Logging (daily rotating file, optional stderr)
//! - Tokio runtime (4 worker threads for REST calls)
//! - Session state ([`SessionManager`]) and the REST client
//! - The push notification bridge, started when enabled in config
//!
//! The main thread runs the [`ConsoleShell`] poll loop until `quit`, end of
//! input, or Ctrl-C. The notification bridge is always stopped before exit.

use anyhow::{Context, Result};
use camino::Utf8Path;
use globaldorm::ui::{ConsoleShell, StdoutSink, spawn_stdin_reader};
use globaldorm::{APP_NAME, ConfigManager, NotificationBridge, ServiceClient, SessionManager, VERSION};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new("GlobalDorm Data")?;
    if config_manager.ensure_client_config()? {
        println!(
            "Wrote default settings to {}",
            config_manager.client_config_path()
        );
    }
    let config = config_manager.load_client_config()?;

    // Held until exit so buffered log lines are flushed
    let _guard = globaldorm::logging::setup_logging(
        Utf8Path::new(&config.client.log_dir),
        "globaldorm",
        config.client.debug_mode,
        config.client.debug_mode,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("globaldorm-worker")
        .build()?;

    let session = SessionManager::new(&config.client).context("Invalid server configuration")?;
    let (server, address) = session.current_server();
    tracing::info!("Using server {} at {}", server, address);

    let client = ServiceClient::new(session, config.client.request_timeout())?;

    let mut notifications = NotificationBridge::amqp(&config.notifications);
    if config.notifications.enabled {
        if let Err(e) = notifications.start() {
            tracing::warn!("Push notifications unavailable: {}", e);
            eprintln!("Push notifications unavailable: {}", e);
        }
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Ctrl-C received, shutting down");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut shell = ConsoleShell::new(
        notifications,
        client,
        Box::new(StdoutSink),
        runtime.handle().clone(),
        config.notifications.poll_interval(),
    );

    println!("{} v{} - type 'help' for commands", APP_NAME, VERSION);
    let commands = spawn_stdin_reader().context("Failed to start input reader")?;
    shell.run(commands, &shutdown);

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");
    Ok(())
}
