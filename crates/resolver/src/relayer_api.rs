//! Typed client for the relayer's coordination api.

use anyhow::Result;
use async_trait::async_trait;
use model::{
    api::{
        AckResponse, ActiveOrdersResponse, CommitRequest, CommitResponse, CompletionRequest,
        EscrowsReadyRequest, OrderStatusView, PriceResponse, StatusResponse,
    },
    order::{Order, OrderHash},
};
use reqwest::{Client, StatusCode, Url};

/// How a commit attempt ended. Losing the capacity race is part of normal
/// operation, not an error.
#[derive(Clone, Debug)]
pub enum CommitOutcome {
    Committed(CommitResponse),
    AlreadyTaken,
}

/// What the resolver needs from a relayer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayerClient: Send + Sync {
    /// Orders currently accepting commitments.
    async fn active_orders(&self) -> Result<Vec<Order>>;

    async fn auction_price(&self, order_hash: OrderHash) -> Result<PriceResponse>;

    async fn order_status(&self, order_hash: OrderHash) -> Result<OrderStatusView>;

    /// Tries to reserve a slice of the order's capacity.
    async fn commit(&self, request: &CommitRequest) -> Result<CommitOutcome>;

    /// Hands the funded escrow pair over for verification.
    async fn escrows_ready(&self, request: &EscrowsReadyRequest) -> Result<AckResponse>;

    async fn notify_completion(&self, request: &CompletionRequest) -> Result<AckResponse>;
}

pub struct RelayerApi {
    base: Url,
    client: Client,
}

impl RelayerApi {
    /// base: protocol and host of the url. example: `http://localhost:8080`
    pub fn new(base: Url, client: Client) -> Self {
        Self { base, client }
    }
}

#[async_trait]
impl RelayerClient for RelayerApi {
    async fn active_orders(&self) -> Result<Vec<Order>> {
        let url = self.base.join("api/active-orders")?;
        let response: ActiveOrdersResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.orders)
    }

    async fn auction_price(&self, order_hash: OrderHash) -> Result<PriceResponse> {
        let url = self.base.join(&format!("api/auction-price/{order_hash}"))?;
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn order_status(&self, order_hash: OrderHash) -> Result<OrderStatusView> {
        let url = self.base.join(&format!("api/order-status/{order_hash}"))?;
        let response: StatusResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.order)
    }

    async fn commit(&self, request: &CommitRequest) -> Result<CommitOutcome> {
        let url = self.base.join("api/commit-resolver")?;
        let response = self.client.post(url).json(request).send().await?;
        // Conflicts mean another resolver holds the capacity, which the
        // caller handles by watching for it to free up again.
        if response.status() == StatusCode::CONFLICT {
            return Ok(CommitOutcome::AlreadyTaken);
        }
        Ok(CommitOutcome::Committed(
            response.error_for_status()?.json().await?,
        ))
    }

    async fn escrows_ready(&self, request: &EscrowsReadyRequest) -> Result<AckResponse> {
        let url = self.base.join("api/escrows-ready")?;
        Ok(self
            .client
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    async fn notify_completion(&self, request: &CompletionRequest) -> Result<AckResponse> {
        let url = self.base.join("api/notify-completion")?;
        Ok(self
            .client
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}
