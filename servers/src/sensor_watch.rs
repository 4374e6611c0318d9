use anyhow::Result;
use lib_sensorfeed::core::TungsteniteConnector;
use lib_sensorfeed::SensorFeed;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

mod feed_logic;
use feed_logic::{config, logger, monitor, setup};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"));
    logger::setup_logging(&log_dir, config.log_level.as_deref().unwrap_or("info"))?;

    let store = setup::build_store(&config)?;
    let fetcher = setup::build_fetcher(&config)?;
    let feed = Arc::new(SensorFeed::new(
        Arc::new(TungsteniteConnector),
        store,
        fetcher,
        config.feed_options()?,
    )
    .await);
    feed.dispatcher().replace(setup::logging_handlers());

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let monitor_handle = tokio::spawn(monitor::run(feed.clone(), shutdown_tx.subscribe()));
    let stdin_handle = tokio::spawn(monitor::forward_stdin(feed.clone(), shutdown_tx.subscribe()));

    let ws_url = config.ws_url.clone().unwrap_or_default();
    let reconnect = config.reconnect.unwrap_or(true);
    log::info!("Starting sensor feed on '{}' (reconnect: {}).", ws_url, reconnect);
    feed.start(&ws_url, reconnect).await;

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    feed.stop().await;

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(monitor_handle, stdin_handle);

    log::info!("Shutdown complete.");
    Ok(())
}
