use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use task_scheduler::api::task_routes;
use task_scheduler::config::SchedulerConfig;
use task_scheduler::error::{DispatchError, Error};
use task_scheduler::tasks::TaskStore;
use task_scheduler::worker::{Dispatcher, DispatcherConfig, requeue_unfinished};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SchedulerConfig::from_env()?;

    eprintln!("Task Scheduler v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Store: {}", config.data_path.display());
    eprintln!(
        "   Workers: {} (queue capacity {})",
        config.workers, config.queue_capacity
    );
    eprintln!("   API: http://{}/tasks\n", config.bind_addr());

    // ── Store ────────────────────────────────────────────────────────────
    let store = Arc::new(
        TaskStore::open(&config.data_path, config.delay)
            .await
            .with_context(|| {
                format!("failed to open task store at {}", config.data_path.display())
            })?,
    );

    // ── Dispatcher ───────────────────────────────────────────────────────
    let dispatcher = Arc::new(Dispatcher::start(
        Arc::clone(&store),
        DispatcherConfig {
            workers: config.workers,
            queue_capacity: config.queue_capacity,
        },
    ));

    // ── Startup Recovery: requeue tasks a previous run never finished ──
    {
        let store = Arc::clone(&store);
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            match requeue_unfinished(&store, &dispatcher).await {
                Ok(_) => {}
                Err(e @ Error::Dispatch(DispatchError::ShuttingDown { .. })) => {
                    warn!(error = %e, "Stopped requeueing during shutdown");
                }
                Err(e) => error!(error = %e, "Failed to requeue unfinished tasks"),
            }
        });
    }

    // ── HTTP API ─────────────────────────────────────────────────────────
    let app = task_routes(Arc::clone(&store), Arc::clone(&dispatcher));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "Task API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // No new submissions can arrive now; let queued work finish.
    info!("HTTP server stopped, draining dispatcher");
    dispatcher.stop().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
