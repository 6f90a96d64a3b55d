//! End to end runs of the resolver against a real relayer API over HTTP,
//! with both services sharing in process chains.

use chrono::Utc;
use escrow::{chain::ChainRegistry, sim::SimChain, state::Asset};
use model::{
    api::CreatedResponse,
    auction::AuctionParams,
    chain::ChainAddress,
    commitment::CommitmentState,
    order::{OrderBuilder, OrderCreation, OrderHash, OrderStatus},
    secret::Secret,
    signature::EcdsaSigningScheme,
    timelocks::Durations,
    DomainSeparator,
};
use primitive_types::{H160, H256, U256};
use relayer::{
    coordinator::Coordinator,
    store::{memory::InMemory, Storage},
};
use resolver::{
    driver::Driver,
    relayer_api::{RelayerApi, RelayerClient},
    strategy::Strategy,
    watcher::OrderWatcher,
};
use secp256k1::SecretKey;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use url::Url;

const SRC_CHAIN: u64 = 1;
const DST_CHAIN: u64 = 137;

fn eth(units: u64) -> U256 {
    U256::from(units) * U256::exp10(18)
}

fn wall_now() -> u64 {
    Utc::now().timestamp() as u64
}

fn verifying_contract() -> H160 {
    H160([0x0c; 20])
}

fn relayer_account() -> ChainAddress {
    ChainAddress::Evm(H160([0x99; 20]))
}

fn maker_asset() -> Asset {
    Asset::Token(ChainAddress::Evm(H160([0x33; 20])))
}

fn taker_asset() -> Asset {
    Asset::Token(ChainAddress::Evm(H160([0x44; 20])))
}

async fn start_relayer(port: u16, chains: ChainRegistry) -> Arc<Coordinator> {
    observe::tracing::initialize_reentrant("warn");
    observe::metrics::setup_registry_reentrant(None, None);
    let store: Arc<dyn Storage> = Arc::new(InMemory::default());
    let coordinator = Arc::new(Coordinator::new(
        store,
        chains,
        verifying_contract(),
        chrono::Duration::minutes(5),
        U256::exp10(16),
        relayer_account(),
    ));
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    let _server = tokio::task::spawn(relayer::api::serve(
        address,
        coordinator.clone(),
        std::future::pending::<()>(),
    ));
    coordinator
}

async fn await_ready(relayer: &dyn RelayerClient) {
    for _ in 0..100 {
        if relayer.active_orders().await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("relayer api did not come up");
}

/// An order whose auction window already closed, so the price rests at the
/// floor of 0.98 and any resolver with a margin under 2% takes it.
fn signed_order(start: u64, secret: &Secret, key: &SecretKey) -> OrderCreation {
    let domain = DomainSeparator::new(SRC_CHAIN, verifying_contract());
    let order = OrderBuilder::default()
        .with_salt(1.into())
        .with_maker_asset(ChainAddress::Evm(H160([0x33; 20])))
        .with_taker_asset(ChainAddress::Evm(H160([0x44; 20])))
        .with_making_amount(eth(100))
        .with_taking_amount(eth(100))
        .with_deadline(start + 3_600)
        .with_chains(SRC_CHAIN, DST_CHAIN)
        .with_auction(AuctionParams {
            start_time: start - 600,
            end_time: start - 300,
            start_price: 1_020_000_000_000_000_000u128.into(),
            end_price: 980_000_000_000_000_000u128.into(),
        })
        .with_secret(secret)
        .sign_with(EcdsaSigningScheme::Eip712, &domain, key)
        .build();
    OrderCreation {
        data: order.data,
        secret: *secret,
        signature: order.signature,
    }
}

async fn broadcast_order(port: u16, creation: &OrderCreation) -> OrderHash {
    let response = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/create-swap"))
        .json(creation)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let created: CreatedResponse = response.json().await.unwrap();
    created.order_hash
}

fn order_watcher(
    relayer: Arc<dyn RelayerClient>,
    chains: ChainRegistry,
    resolver: ChainAddress,
) -> OrderWatcher {
    OrderWatcher {
        relayer,
        chains,
        strategy: Strategy {
            reference_price: U256::exp10(18),
            min_profit_bps: 50,
            max_fill_bps: 10_000,
        },
        resolver,
        per_unit_safety_deposit: U256::exp10(16),
        durations: Durations::default(),
        poll_interval: Duration::from_millis(50),
        fast_poll_interval: Duration::from_millis(20),
    }
}

async fn await_status(coordinator: &Coordinator, order_hash: &OrderHash, status: OrderStatus) {
    for _ in 0..200 {
        if coordinator.order_status(order_hash).await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("order never reached {status}");
}

#[tokio::test]
async fn resolver_settles_a_profitable_swap_over_http() {
    let port = 18_081;
    let start = wall_now();
    let src = Arc::new(SimChain::new(SRC_CHAIN, start));
    let dst = Arc::new(SimChain::new(DST_CHAIN, start));
    let chains = ChainRegistry::new()
        .with_chain(src.clone())
        .with_chain(dst.clone());
    let coordinator = start_relayer(port, chains.clone()).await;

    let base = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
    let relayer: Arc<dyn RelayerClient> =
        Arc::new(RelayerApi::new(base.clone(), reqwest::Client::new()));
    await_ready(relayer.as_ref()).await;

    let key = SecretKey::from_slice(&[7; 32]).unwrap();
    let secret = Secret(H256([0x5e; 32]));
    let creation = signed_order(start, &secret, &key);
    let maker = creation.data.maker.clone();
    let resolver = ChainAddress::Evm(H160([0x51; 20]));

    // The maker pre approves the principal, the resolver carries deposits
    // and the taker asset inventory.
    src.mint(maker.clone(), maker_asset(), eth(100));
    src.mint(resolver.clone(), Asset::Native, eth(1));
    dst.mint(resolver.clone(), Asset::Native, eth(1));
    dst.mint(resolver.clone(), taker_asset(), eth(200));

    let order_hash = broadcast_order(port, &creation).await;

    let watcher = order_watcher(relayer, chains, resolver.clone());
    let mut driver = Driver::new(Arc::new(watcher), Duration::from_millis(50));
    driver.single_run().await.unwrap();
    await_status(&coordinator, &order_hash, OrderStatus::Completed).await;

    let view = coordinator.order_status(&order_hash).await.unwrap();
    assert!(view.fully_filled);
    assert!(view.secret_revealed_at.is_some());
    assert_eq!(view.commitments.len(), 1);
    assert_eq!(view.commitments[0].state, CommitmentState::Completed);
    assert!(view.commitments[0].src_escrow.is_some());
    assert!(view.commitments[0].dst_escrow.is_some());

    // 100 maker units moved to the resolver on the source chain, 98 taker
    // units to the maker on the destination, and both safety deposits came
    // back.
    assert_eq!(src.balance(&maker, &maker_asset()), U256::zero());
    assert_eq!(src.balance(&resolver, &maker_asset()), eth(100));
    assert_eq!(dst.balance(&maker, &taker_asset()), eth(98));
    assert_eq!(dst.balance(&resolver, &taker_asset()), eth(102));
    assert_eq!(src.balance(&resolver, &Asset::Native), eth(1));
    assert_eq!(dst.balance(&resolver, &Asset::Native), eth(1));

    // The status endpoint serves the same picture over HTTP.
    let api = RelayerApi::new(base, reqwest::Client::new());
    let status = api.order_status(order_hash).await.unwrap();
    assert_eq!(status.status, OrderStatus::Completed);
    assert_eq!(status.filled_amount, eth(100));
}

#[tokio::test]
async fn slashed_commitments_reopen_the_auction() {
    let port = 18_082;
    let start = wall_now();
    let src = Arc::new(SimChain::new(SRC_CHAIN, start));
    let dst = Arc::new(SimChain::new(DST_CHAIN, start));
    let chains = ChainRegistry::new()
        .with_chain(src.clone())
        .with_chain(dst.clone());
    let coordinator = start_relayer(port, chains.clone()).await;

    let base = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
    let relayer: Arc<dyn RelayerClient> =
        Arc::new(RelayerApi::new(base, reqwest::Client::new()));
    await_ready(relayer.as_ref()).await;

    let key = SecretKey::from_slice(&[9; 32]).unwrap();
    let secret = Secret(H256([0x6e; 32]));
    let creation = signed_order(start, &secret, &key);
    let maker = creation.data.maker.clone();
    let order_hash = broadcast_order(port, &creation).await;

    // The first resolver wins the race and then never builds its escrows.
    let ghost = ChainAddress::Evm(H160([0x51; 20]));
    coordinator
        .commit_resolver(
            order_hash,
            ghost.clone(),
            eth(40),
            980_000_000_000_000_000u128.into(),
        )
        .await
        .unwrap();
    let view = coordinator.order_status(&order_hash).await.unwrap();
    assert_eq!(view.status, OrderStatus::Committed);

    // Past the commitment deadline the sweeper slashes it, which releases
    // the capacity and rebroadcasts the order.
    coordinator
        .sweep(Utc::now() + chrono::Duration::minutes(6))
        .await
        .unwrap();
    let view = coordinator.order_status(&order_hash).await.unwrap();
    assert_eq!(view.status, OrderStatus::RescueAvailable);
    assert_eq!(view.remaining_amount, eth(100));

    // A second resolver picks the order up again and settles all of it.
    let resolver = ChainAddress::Evm(H160([0x52; 20]));
    src.mint(maker.clone(), maker_asset(), eth(100));
    src.mint(resolver.clone(), Asset::Native, eth(1));
    dst.mint(resolver.clone(), Asset::Native, eth(1));
    dst.mint(resolver.clone(), taker_asset(), eth(200));

    let watcher = order_watcher(relayer, chains, resolver.clone());
    let mut driver = Driver::new(Arc::new(watcher), Duration::from_millis(50));
    driver.single_run().await.unwrap();
    await_status(&coordinator, &order_hash, OrderStatus::Completed).await;

    let view = coordinator.order_status(&order_hash).await.unwrap();
    assert!(view.fully_filled);
    assert_eq!(view.commitments.len(), 2);
    let slashed = view
        .commitments
        .iter()
        .find(|commitment| commitment.resolver == ghost)
        .unwrap();
    assert_eq!(slashed.state, CommitmentState::Slashable);
    let winner = view
        .commitments
        .iter()
        .find(|commitment| commitment.resolver == resolver)
        .unwrap();
    assert_eq!(winner.state, CommitmentState::Completed);
    assert_eq!(winner.partial_amount, eth(100));
    assert_eq!(dst.balance(&maker, &taker_asset()), eth(98));
}
