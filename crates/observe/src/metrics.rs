use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use prometheus_metric_storage::StorageRegistry;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, OnceLock},
};
use tokio::task::JoinHandle;

/// The default port at which prometheus metrics and the liveness probe are
/// exposed.
pub const DEFAULT_METRICS_PORT: u16 = 9586;

static REGISTRY: OnceLock<StorageRegistry> = OnceLock::new();

/// Configures a global metrics registry, optionally prefixing every metric
/// and attaching a fixed label set.
///
/// Panics when called a second time.
pub fn setup_registry(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = StorageRegistry::new(registry);
    REGISTRY.set(storage_registry).unwrap();
}

/// Like [`setup_registry`], but can be called multiple times in a row.
/// Later calls are ignored.
///
/// Useful for tests.
pub fn setup_registry_reentrant(prefix: Option<String>, labels: Option<HashMap<String, String>>) {
    let registry = Registry::new_custom(prefix, labels).unwrap();
    let storage_registry = StorageRegistry::new(registry);
    let _ = REGISTRY.set(storage_registry);
}

pub fn get_registry() -> &'static Registry {
    get_storage_registry().registry()
}

pub fn get_storage_registry() -> &'static StorageRegistry {
    REGISTRY.get_or_init(|| StorageRegistry::new(Registry::new_custom(None, None).unwrap()))
}

pub fn encode(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    // Unwrap because writing to a vec cannot fail.
    encoder.encode(&registry.gather(), &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[async_trait]
pub trait LivenessChecking: Send + Sync {
    async fn is_alive(&self) -> bool;
}

/// Exposes the metrics and liveness endpoints on a background task.
pub fn serve_metrics(
    liveness: Arc<dyn LivenessChecking>,
    address: SocketAddr,
) -> JoinHandle<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/liveness", get(liveness_handler))
        .with_state(liveness);
    tracing::info!(%address, "serving metrics");
    tokio::task::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(address).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(?err, %address, "failed to bind metrics server");
                return;
            }
        };
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(?err, "metrics server terminated");
        }
    })
}

async fn metrics_handler() -> String {
    encode(get_registry())
}

async fn liveness_handler(State(liveness): State<Arc<dyn LivenessChecking>>) -> StatusCode {
    if liveness.is_alive().await {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_the_default_registry() {
        let registry = get_registry();
        // No metrics registered in this test but encoding must not fail.
        let _ = encode(registry);
    }
}
