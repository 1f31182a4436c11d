use anyhow::Result;
use tokio::signal;

mod frame_logic;
use frame_logic::{config, logger, routes, state};

#[tokio::main]
async fn main() -> Result<()> {
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = config::load_config();
    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("./logs"));
    logger::setup_logging(&log_dir, config.log_level.as_deref().unwrap_or("info"))?;

    let data_dir = config
        .data_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("./data"));
    let app_state = state::AppState::open(&data_dir)?;
    log::info!(
        "Stores opened under {} ({} photo(s), {} client(s))",
        data_dir.display(),
        app_state.inventory.stats().total,
        app_state.registry.all_clients().len()
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let server_handle = tokio::spawn(routes::run(
        config.clone(),
        app_state.clone(),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate()).unwrap();
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to the server
    let _ = shutdown_tx.send(());

    // Wait for the server to shut down
    let _ = server_handle.await;

    log::info!("Shutdown complete.");
    Ok(())
}
