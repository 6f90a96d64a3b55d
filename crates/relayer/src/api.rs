//! HTTP surface of the relayer.
//!
//! Handlers are thin: deserialize, call into the [`Coordinator`], map the
//! outcome to a status code and the shared error envelope. Everything
//! behavioral lives in [`crate::coordinator`].

use crate::coordinator::Coordinator;
use axum::{
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    future::Future,
    net::SocketAddr,
    sync::Arc,
    time::Instant,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod active_orders;
mod auction_price;
mod commit_resolver;
mod create_swap;
mod escrows_ready;
mod notify_completion;
mod order_status;

/// State shared across all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Middleware tracking per route metrics keyed by the matched path, so
/// `/api/order-status/{hash}` counts as one route and not one per hash.
async fn with_matched_path_metric(req: Request, next: Next) -> Response {
    let metrics = ApiMetrics::instance(observe::metrics::get_storage_registry()).unwrap();

    let method = req.method().as_str();
    let matched_path = req
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|path| path.as_str())
        .unwrap_or("unknown");
    let label = format!("{method} {matched_path}");

    let timer = Instant::now();
    let response = next.run(req).await;
    let status = response.status();

    metrics.on_request_completed(&label, status, timer);
    if status.is_client_error() || status.is_server_error() {
        metrics
            .requests_rejected
            .with_label_values(&[status.as_str()])
            .inc();
    }

    response
}

const MAX_JSON_BODY_PAYLOAD: u64 = 1024 * 16;

pub fn handle_all_routes(coordinator: Arc<Coordinator>) -> Router {
    let state = Arc::new(AppState { coordinator });

    let metrics = ApiMetrics::instance(observe::metrics::get_storage_registry()).unwrap();
    metrics.reset_requests_rejected();

    let api_router = Router::new()
        .route(
            "/create-swap",
            axum::routing::post(create_swap::create_swap_handler),
        )
        .route(
            "/commit-resolver",
            axum::routing::post(commit_resolver::commit_resolver_handler),
        )
        .route(
            "/order-status/{hash}",
            axum::routing::get(order_status::order_status_handler),
        )
        .route(
            "/auction-price/{hash}",
            axum::routing::get(auction_price::auction_price_handler),
        )
        .route(
            "/escrows-ready",
            axum::routing::post(escrows_ready::escrows_ready_handler),
        )
        .route(
            "/notify-completion",
            axum::routing::post(notify_completion::notify_completion_handler),
        )
        .route(
            "/active-orders",
            axum::routing::get(active_orders::active_orders_handler),
        )
        .with_state(state)
        .layer(middleware::from_fn(with_matched_path_metric));

    finalize_router(api_router)
}

/// Binds the API server and runs it until the shutdown future resolves.
pub async fn serve(
    address: SocketAddr,
    coordinator: Arc<Coordinator>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let router = handle_all_routes(coordinator);
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "serving the relayer api");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "api")]
struct ApiMetrics {
    /// Number of completed API requests.
    #[metric(labels("method", "status_code"))]
    requests_complete: prometheus::IntCounterVec,

    /// Number of rejected API requests.
    #[metric(labels("status_code"))]
    requests_rejected: prometheus::IntCounterVec,

    /// Execution time for each API request.
    #[metric(labels("method"), buckets(0.1, 0.5, 1, 2, 4, 6, 8, 10))]
    requests_duration_seconds: prometheus::HistogramVec,
}

impl ApiMetrics {
    /// Status codes the handlers produce.
    const INITIAL_STATUSES: &'static [StatusCode] = &[
        StatusCode::OK,
        StatusCode::CREATED,
        StatusCode::BAD_REQUEST,
        StatusCode::UNAUTHORIZED,
        StatusCode::NOT_FOUND,
        StatusCode::CONFLICT,
        StatusCode::INTERNAL_SERVER_ERROR,
    ];

    fn reset_requests_rejected(&self) {
        for status in Self::INITIAL_STATUSES {
            self.requests_rejected
                .with_label_values(&[status.as_str()])
                .reset();
        }
    }

    fn on_request_completed(&self, method: &str, status: StatusCode, timer: Instant) {
        self.requests_complete
            .with_label_values(&[method, status.as_str()])
            .inc();
        self.requests_duration_seconds
            .with_label_values(&[method])
            .observe(timer.elapsed().as_secs_f64());
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Error {
    pub error_type: Cow<'static, str>,
    pub description: Cow<'static, str>,
}

pub fn error(error_type: &'static str, description: impl AsRef<str>) -> Json<Error> {
    Json(Error {
        error_type: error_type.into(),
        description: Cow::Owned(description.as_ref().to_owned()),
    })
}

pub fn internal_error_reply() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error("InternalServerError", ""),
    )
        .into_response()
}

/// Nests the routes under /api and applies body limits, cors and request
/// tracing.
fn finalize_router(api_router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods(vec![
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(vec![
            axum::http::header::ORIGIN,
            axum::http::header::CONTENT_TYPE,
        ]);

    Router::new()
        .nest("/api", api_router)
        .layer(DefaultBodyLimit::max(MAX_JSON_BODY_PAYLOAD as usize))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub async fn response_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}
