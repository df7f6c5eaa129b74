//! Cluster manager process: wires the [`Coordinator`] to the database nodes,
//! the periodic jobs and the HTTP listener.

use {
    coordinator::Coordinator,
    futures::Future,
    metrics_exporter_prometheus::PrometheusHandle,
    std::sync::Arc,
    tap::TapFallible as _,
    tokio_util::sync::CancellationToken,
};

pub use {
    config::{Config, LogFormat, Logging},
    connection::{PgConnection, Timeouts},
    jobs::{Intervals, Jobs},
};

mod config;
mod connection;
mod http;
mod jobs;

pub mod logger;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to start HTTP server: {0}")]
    Http(#[from] hyper::Error),
}

/// Runs the cluster manager until `shutdown` resolves.
///
/// Subsystems are stopped in order: the HTTP listener, the job scheduler,
/// the node sessions, and finally the topology.
pub async fn run(
    cfg: Config,
    prometheus: PrometheusHandle,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let conn = PgConnection::new(cfg.timeouts);
    let coordinator = Arc::new(Coordinator::new(conn, cfg.coordinator()));

    let http_token = CancellationToken::new();
    let (_, server) = http::serve(
        cfg.http_addr,
        coordinator.clone(),
        prometheus,
        http_token.clone().cancelled_owned(),
    )?;
    let server = tokio::spawn(async move {
        server
            .await
            .tap_err(|err| tracing::error!(?err, "HTTP server failed"))
    });

    let jobs = Jobs::spawn(coordinator.clone(), cfg.intervals);

    shutdown.await;
    tracing::info!("Shutting down");

    http_token.cancel();
    match server.await {
        Ok(_) => tracing::info!("HTTP server stopped"),
        Err(err) => tracing::error!(?err, "HTTP server task failed"),
    }

    jobs.stop().await;

    let sessions = coordinator.connection().close();
    tracing::info!(sessions, "Node sessions closed");

    let clusters = coordinator.shutdown().await;
    tracing::info!(clusters, "Shutdown complete");

    Ok(())
}
