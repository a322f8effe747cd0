use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use ytscribe::{Orchestrator, Settings};
use ytscribe_server::observability::init_tracing;
use ytscribe_server::{create_router, preflight, AppState, ServerSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(ServerSettings::json_logs_from_env());
    let server = ServerSettings::from_env();

    let settings = Settings::from_env();
    info!(
        model = %settings.model,
        model_dir = %settings.resolve_model_dir().display(),
        scratch_dir = %settings.resolve_scratch_dir().display(),
        max_concurrent_inference = settings.max_concurrent_inference,
        "engine configured"
    );

    preflight::check_tools().await;

    let state = AppState::new(Orchestrator::from_settings(&settings));

    if server.preload_model {
        let model = Arc::clone(state.orchestrator.model());
        tokio::spawn(async move {
            if let Err(e) = model.get_or_load().await {
                error!(error = %e, "model preload failed, will retry on first request");
            }
        });
    }

    let router = create_router(state);

    let addr = server.addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining requests");
}
