//! Discovery loop that keeps one watch task running per active order.

use crate::watcher::OrderWatcher;
use anyhow::Result;
use model::order::{Order, OrderHash};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};

/// One spawned watch with its cancellation token. Dropping the sender would
/// also cancel, [`Driver::shutdown`] does it explicitly so it can join the
/// task afterwards.
struct WatchTask {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Driver {
    watcher: Arc<OrderWatcher>,
    poll_interval: Duration,
    in_flight: HashMap<OrderHash, WatchTask>,
}

impl Driver {
    pub fn new(watcher: Arc<OrderWatcher>, poll_interval: Duration) -> Self {
        Self {
            watcher,
            poll_interval,
            in_flight: HashMap::new(),
        }
    }

    pub async fn run_forever(&mut self) -> ! {
        loop {
            match self.single_run().await {
                Ok(()) => tracing::debug!("discovery run finished ok"),
                Err(err) => tracing::error!("discovery run errored: {:?}", err),
            }
            Metrics::get().runloops.inc();
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Fetches the active orders and spawns a watch task for every order not
    /// already being watched.
    pub async fn single_run(&mut self) -> Result<()> {
        self.in_flight.retain(|_, task| !task.handle.is_finished());
        let orders = self.watcher.relayer.active_orders().await?;
        tracing::debug!("found {} active orders", orders.len());
        for order in orders {
            let order_hash = order.metadata.order_hash;
            if self.in_flight.contains_key(&order_hash) {
                continue;
            }
            Metrics::get().orders_discovered.inc();
            self.in_flight.insert(order_hash, self.spawn_watch(order));
        }
        Ok(())
    }

    fn spawn_watch(&self, order: Order) -> WatchTask {
        let order_hash = order.metadata.order_hash;
        let (cancel, mut cancelled) = watch::channel(false);
        let watcher = self.watcher.clone();
        let handle = tokio::task::spawn(async move {
            tokio::select! {
                outcome = watcher.settle(order) => match outcome {
                    Ok(outcome) => {
                        tracing::info!(%order_hash, ?outcome, "order watch finished")
                    }
                    Err(err) => tracing::error!(%order_hash, ?err, "order watch failed"),
                },
                _ = cancelled.changed() => {
                    tracing::debug!(%order_hash, "order watch cancelled")
                }
            }
        });
        WatchTask { cancel, handle }
    }

    /// Cancels every in flight watch and waits for the tasks to wind down.
    pub async fn shutdown(self) {
        for (order_hash, task) in self.in_flight {
            let _ = task.cancel.send(true);
            if task.handle.await.is_err() {
                tracing::warn!(%order_hash, "watch task panicked");
            }
        }
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
#[metric(subsystem = "driver")]
struct Metrics {
    /// Discovery loop iterations.
    runloops: prometheus::IntCounter,
    /// Orders picked up for watching.
    orders_discovered: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        // Always succeeds with the default registry.
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
