use {
    anyhow::Context as _,
    cmgr_node::{logger::Logger, Config},
    metrics_exporter_prometheus::PrometheusBuilder,
};

mod signal;

fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env().context("failed to parse config")?;
    let logger = Logger::init(&cfg.logging).context("invalid LOG_LEVEL")?;

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("install Prometheus recorder")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        meta = %cfg.meta_bootstrap.addr,
        http = %cfg.http_addr,
        "Starting"
    );

    let res = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?
        .block_on(async move {
            let shutdown = signal::shutdown()?;
            cmgr_node::run(cfg, prometheus, shutdown)
                .await
                .context("cmgr_node::run")
        });

    if let Err(err) = &res {
        tracing::error!(?err, "Cluster manager failed");
    }

    logger.stop();
    res
}
