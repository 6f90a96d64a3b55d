use clap::Parser;
use escrow::{chain::ChainRegistry, sim::SimChain};
use model::chain::ChainAddress;
use observe::metrics::{serve_metrics, LivenessChecking};
use resolver::{
    arguments::Arguments,
    driver::Driver,
    relayer_api::{RelayerApi, RelayerClient},
    strategy::Strategy,
    watcher::OrderWatcher,
};
use std::{sync::Arc, time::Duration};

#[tokio::main]
async fn main() {
    let args = Arguments::parse();
    observe::tracing::initialize(&args.log_filter);
    tracing::info!("running resolver with validated arguments:\n{}", args);
    observe::metrics::setup_registry(Some("resolver".into()), None);

    let durations = args.durations().expect("invalid timelock schedule");
    let genesis =
        u64::try_from(chrono::Utc::now().timestamp()).expect("system clock before unix epoch");
    let mut chains = ChainRegistry::new();
    for chain_id in &args.sim_chains {
        chains = chains.with_chain(Arc::new(SimChain::new(*chain_id, genesis)));
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build http client");
    let relayer: Arc<dyn RelayerClient> =
        Arc::new(RelayerApi::new(args.relayer_url.clone(), client));

    let watcher = Arc::new(OrderWatcher {
        relayer: relayer.clone(),
        chains,
        strategy: Strategy {
            reference_price: args.reference_price,
            min_profit_bps: args.min_profit_bps,
            max_fill_bps: args.max_fill_bps,
        },
        resolver: ChainAddress::Evm(args.resolver_address),
        per_unit_safety_deposit: args.per_unit_safety_deposit,
        durations,
        poll_interval: args.poll_interval,
        fast_poll_interval: args.fast_poll_interval,
    });
    let mut driver = Driver::new(watcher, args.poll_interval);

    serve_metrics(
        Arc::new(Liveness { relayer }),
        ([0, 0, 0, 0], args.metrics_port).into(),
    );
    driver.run_forever().await
}

struct Liveness {
    relayer: Arc<dyn RelayerClient>,
}

#[async_trait::async_trait]
impl LivenessChecking for Liveness {
    async fn is_alive(&self) -> bool {
        self.relayer.active_orders().await.is_ok()
    }
}
