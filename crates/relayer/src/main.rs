use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use escrow::{chain::ChainRegistry, sim::SimChain};
use model::chain::ChainAddress;
use observe::metrics::{serve_metrics, LivenessChecking};
use relayer::{
    api,
    arguments::{Arguments, StorageBackend},
    coordinator::Coordinator,
    store::{memory::InMemory, postgres::Postgres, Storage},
};
use std::{sync::Arc, time::Duration};

#[tokio::main]
async fn main() {
    let args = Arguments::parse();
    observe::tracing::initialize(args.log_filter.as_str());
    tracing::info!("running relayer with validated arguments:\n{}", args);

    observe::metrics::setup_registry(Some("relayer".into()), None);

    let store: Arc<dyn Storage> = match args.storage {
        StorageBackend::Memory => Arc::new(InMemory::default()),
        StorageBackend::Postgres => {
            Arc::new(Postgres::new(args.db_url.as_str()).expect("failed to create database"))
        }
    };
    check_storage_connection(store.as_ref()).await;

    let genesis = u64::try_from(Utc::now().timestamp()).expect("system clock before unix epoch");
    let mut chains = ChainRegistry::new();
    for chain_id in &args.sim_chains {
        chains = chains.with_chain(Arc::new(SimChain::new(*chain_id, genesis)));
    }

    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        chains,
        args.verifying_contract,
        chrono::Duration::from_std(args.commitment_deadline)
            .expect("commitment deadline out of range"),
        args.per_unit_safety_deposit,
        ChainAddress::Evm(args.relayer_address),
    ));

    let (shutdown_sender, shutdown_receiver) = tokio::sync::oneshot::channel();
    let serve_api = api::serve(args.bind_address, coordinator.clone(), async {
        let _ = shutdown_receiver.await;
    });
    let sweeper_task = coordinator.spawn_sweeper(args.sweep_interval);

    let mut metrics_address = args.bind_address;
    metrics_address.set_port(args.metrics_port);
    let metrics_task = serve_metrics(Arc::new(Liveness { store }), metrics_address);

    futures::pin_mut!(serve_api);
    tokio::select! {
        result = &mut serve_api => tracing::error!(?result, "API task exited"),
        result = sweeper_task => tracing::error!(?result, "sweeper task exited"),
        result = metrics_task => tracing::error!(?result, "metrics task exited"),
        _ = shutdown_signal() => {
            tracing::info!("Gracefully shutting down API");
            shutdown_sender.send(()).expect("failed to send shutdown signal");
            match tokio::time::timeout(Duration::from_secs(10), serve_api).await {
                Ok(inner) => inner.expect("API failed during shutdown"),
                Err(_) => tracing::error!("API shutdown exceeded timeout"),
            }
        }
    };
}

struct Liveness {
    store: Arc<dyn Storage>,
}

#[async_trait]
impl LivenessChecking for Liveness {
    async fn is_alive(&self) -> bool {
        self.store.order(&Default::default()).await.is_ok()
    }
}

async fn check_storage_connection(store: &dyn Storage) {
    store
        .order(&Default::default())
        .await
        .expect("failed to connect to storage");
}

#[cfg(unix)]
async fn shutdown_signal() {
    // Intercept main signals for graceful shutdown
    // Kubernetes sends sigterm, whereas locally sigint (ctrl-c) is most common
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .unwrap()
            .recv()
            .await
    };
    let sigint = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .unwrap()
            .recv()
            .await;
    };
    futures::pin_mut!(sigint);
    futures::pin_mut!(sigterm);
    futures::future::select(sigterm, sigint).await;
}

#[cfg(windows)]
async fn shutdown_signal() {
    // We don't support signal handling on windows
    std::future::pending().await
}
