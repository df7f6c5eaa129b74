use {
    admin_api::{Request, Response},
    axum::{
        extract::State,
        routing::{get, post},
        Json,
        Router,
    },
    coordinator::Coordinator,
    futures::Future,
    metrics_exporter_prometheus::PrometheusHandle,
    node_api::NodeConnection,
    std::{net::SocketAddr, sync::Arc},
};

/// Binds the HTTP listener serving admin requests on `POST /` and Prometheus
/// metrics on `GET /metrics`.
///
/// Returns the bound address and the server future, which completes after
/// `shutdown` resolves and the in-flight requests are answered.
pub fn serve<C: NodeConnection>(
    addr: SocketAddr,
    coordinator: Arc<Coordinator<C>>,
    prometheus: PrometheusHandle,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = Result<(), hyper::Error>>), hyper::Error> {
    let svc = Router::new()
        .route("/", post(dispatch::<C>))
        .route(
            "/metrics",
            get(move || async move { prometheus.render() }),
        )
        .with_state(coordinator)
        .into_make_service();

    let server = axum::Server::try_bind(&addr)?.serve(svc);
    let local_addr = server.local_addr();
    tracing::info!(addr = %local_addr, "HTTP server started");

    Ok((local_addr, server.with_graceful_shutdown(shutdown)))
}

async fn dispatch<C: NodeConnection>(
    State(coordinator): State<Arc<Coordinator<C>>>,
    Json(req): Json<Request>,
) -> Json<Response> {
    metrics::counter!("cmgr_admin_requests_total").increment(1);
    tracing::debug!(?req, "Admin request");

    Json(coordinator.dispatch(req).await)
}
