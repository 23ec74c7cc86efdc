use crate::error::RpcError;
use crate::rpc::RpcServer;
use crate::server::metrics::Metrics;
use crate::transport::framing::Framing;
use crate::transport::session::respond;
use crate::transport::shutdown::wait_for_shutdown;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Path the client posts calls to.
pub const RPC_PATH: &str = "/rpc";

/// HTTP-tunneled variant of the protocol.
///
/// Every `POST /` or `POST /rpc` body is one line-delimited text frame holding
/// a request; the response body is the matching text frame. The keep-alive
/// connection plays the part of the session. `GET /health` and
/// `GET /metrics` sit beside it.
pub struct HttpTransport {
    server: Arc<RpcServer>,
    metrics: Arc<Metrics>,
    max_in_flight: Option<usize>,
}

impl HttpTransport {
    pub fn new(server: Arc<RpcServer>) -> Self {
        Self {
            server,
            metrics: Arc::new(Metrics::new()),
            max_in_flight: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_max_in_flight(mut self, max: Option<usize>) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn router(self) -> Router {
        let max_in_flight = self.max_in_flight;
        let state = Arc::new(self);

        let mut rpc = Router::new()
            .route("/", post(rpc_handler))
            .route(RPC_PATH, post(rpc_handler))
            .with_state(state.clone());
        // Router::layer wraps each route on its own; the global layer keeps
        // one semaphore for both call paths
        if let Some(max) = max_in_flight {
            rpc = rpc.layer(GlobalConcurrencyLimitLayer::new(max));
        }

        Router::new()
            .route("/health", get(health_check))
            .route("/metrics", get(get_metrics))
            .with_state(state)
            .merge(rpc)
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self, addr: &str, shutdown: broadcast::Receiver<()>) -> Result<(), RpcError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RpcError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires, then drain.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RpcError> {
        info!("HTTP RPC server listening on {}", listener.local_addr()?);
        let metrics = self.metrics.clone();

        axum::serve(listener, self.router())
            .with_graceful_shutdown(wait_for_shutdown(shutdown))
            .await?;

        info!("Shutting down HTTP server");
        metrics.snapshot().await.log();
        Ok(())
    }
}

async fn rpc_handler(State(transport): State<Arc<HttpTransport>>, body: Bytes) -> Response {
    let framing = Framing::LineDelimited;
    let response = respond(&transport.server, &framing, &body, &transport.metrics).await;

    match framing.encode(&response) {
        Ok(frame) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            frame,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn get_metrics(State(transport): State<Arc<HttpTransport>>) -> impl IntoResponse {
    (StatusCode::OK, Json(transport.metrics.snapshot().await))
}

async fn health_check(State(transport): State<Arc<HttpTransport>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "methods": transport.server.methods(),
        })),
    )
}
