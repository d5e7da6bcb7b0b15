use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tls_relay::cert::loader;
use tls_relay::{Config, LogFormat, RelayListener};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.log_format);
    info!(
        listen = %config.listen_addr,
        cert = %config.cert_path.display(),
        max_sessions = ?config.max_sessions,
        "tls-relay starting"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "tls-relay exited with error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> tls_relay::Result<()> {
    let tls_config = loader::load_server_config(&config.cert_path, &config.key_path).await?;
    let listener = RelayListener::bind(&config, tls_config).await?;

    // Shutdown signal channel.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let relay_handle = tokio::spawn(async move {
        if let Err(e) = listener.run(shutdown_rx).await {
            error!(error = %e, "TLS relay failed");
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);

    let _ = relay_handle.await;
    info!("tls-relay stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
    }
}

fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}
