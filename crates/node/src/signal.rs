use {
    anyhow::Context as _,
    futures::Future,
    std::pin::pin,
    tokio::signal::unix::{self, Signal, SignalKind},
};

/// Resolves on the first SIGTERM or SIGINT.
pub(crate) fn shutdown() -> anyhow::Result<impl Future<Output = ()>> {
    let mut sigterm = listener(SignalKind::terminate())?;
    let mut sigint = listener(SignalKind::interrupt())?;

    Ok(async move {
        let mut sigterm = pin!(sigterm.recv());
        let mut sigint = pin!(sigint.recv());

        tokio::select! {
            _ = &mut sigterm => tracing::info!("SIGTERM received"),
            _ = &mut sigint => tracing::info!("SIGINT received"),
        }
    })
}

fn listener(kind: SignalKind) -> anyhow::Result<Signal> {
    unix::signal(kind).with_context(|| format!("Failed to initialize {kind:?} listener"))
}
