#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use args::Args;
use clap::Parser;
use prism_config::Config;
use prism_server::Server;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;

    if let Some(listen) = args.listen {
        config.server.listen_address = Some(listen);
    }

    prism_telemetry::init(&config.logging)?;

    tracing::info!(
        config_path = %args.config.display(),
        "starting prism"
    );

    let server = Server::new(&config)?;

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(args.config.clone(), server.media(), shutdown.clone()));

    server.serve(shutdown).await?;

    tracing::info!("prism stopped");
    Ok(())
}

/// Reload the catalog and provider keys on every `SIGHUP`
///
/// A config that fails to load or build leaves the running catalog in place.
#[cfg(unix)]
async fn reload_on_hangup(
    path: std::path::PathBuf,
    media: std::sync::Arc<prism_server::MediaService>,
    shutdown: CancellationToken,
) {
    let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable, config reload disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            received = hangup.recv() => {
                if received.is_none() {
                    return;
                }
            }
        }

        tracing::info!(config_path = %path.display(), "reloading configuration");

        let result = Config::load(&path).and_then(|config| media.reload(&config).map_err(anyhow::Error::from));

        if let Err(e) = result {
            tracing::error!(error = %e, "configuration reload failed, keeping previous catalog");
        }
    }
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
