use caddy_gen::config::Config;
use caddy_gen::docker::DockerPlatform;
use caddy_gen::reconcile::Reconciler;
use caddy_gen::{PKG_NAME, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("caddy_gen=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("caddy-gen.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    print_startup_banner(&config);

    let platform = DockerPlatform::connect(config.docker.host.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to Docker");
            e
        })?;

    let reconciler = Reconciler::from_config(Arc::new(platform), &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler_handle = tokio::spawn(async move {
        reconciler.run(shutdown_rx).await;
    });

    wait_for_shutdown().await;

    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(Duration::from_secs(5), reconciler_handle)
        .await
        .is_err()
    {
        error!("Reconciler did not stop in time");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl+C, shutting down...");
    }
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting Caddy config generator");
    info!(
        docker_host = config.docker.host.as_deref().unwrap_or("auto"),
        network = %config.docker.network,
        label = %config.docker.label,
        "Container selection"
    );
    info!(
        path = %config.output.path,
        debounce_ms = config.watch.debounce_ms,
        backoff_secs = config.watch.backoff_secs,
        "Output settings"
    );
    match config.notify {
        Some(ref notify) => info!(
            command = ?notify.command,
            container_id = notify.container_id.as_deref().unwrap_or("local"),
            working_dir = ?notify.working_dir,
            "Notify settings"
        ),
        None => info!("Notify disabled"),
    }
}
