//! Request and response bodies of the coordination API.
//!
//! Shared between the relayer's handlers and the resolver's client so the
//! two sides cannot drift apart.

use crate::{
    chain::ChainAddress,
    commitment::Commitment,
    escrow::EscrowId,
    order::{Order, OrderHash, OrderStatus},
    u256_decimal,
};
use chrono::{DateTime, Utc};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub order_hash: OrderHash,
    pub resolver: ChainAddress,
    #[serde(with = "u256_decimal")]
    pub partial_amount: U256,
    #[serde(with = "u256_decimal")]
    pub accepted_price: U256,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowsReadyRequest {
    pub order_hash: OrderHash,
    pub resolver: ChainAddress,
    pub src_escrow: EscrowId,
    pub dst_escrow: EscrowId,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub order_hash: OrderHash,
    pub resolver: ChainAddress,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub success: bool,
    pub order_hash: OrderHash,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub success: bool,
    pub order_hash: OrderHash,
    #[serde(with = "u256_decimal")]
    pub partial_amount: U256,
    pub commitment_deadline: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub order: OrderStatusView,
}

/// Settlement progress of one order as reported by the status endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusView {
    pub order_hash: OrderHash,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(with = "u256_decimal")]
    pub total_amount: U256,
    #[serde(with = "u256_decimal")]
    pub filled_amount: U256,
    #[serde(with = "u256_decimal")]
    pub remaining_amount: U256,
    pub fully_filled: bool,
    pub commitments: Vec<Commitment>,
    pub secret_revealed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceResponse {
    pub success: bool,
    pub order_hash: OrderHash,
    #[serde(with = "u256_decimal")]
    pub current_price: U256,
    #[serde(with = "u256_decimal")]
    pub remaining_amount: U256,
    /// Taker asset owed for the remaining capacity at the current price.
    #[serde(with = "u256_decimal")]
    pub taking_amount_for_remaining: U256,
    pub auction_start_time: u64,
    pub auction_end_time: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveOrdersResponse {
    pub success: bool,
    pub orders: Vec<Order>,
}

/// Generic acknowledgement carrying the order's new status.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub success: bool,
    pub order_hash: OrderHash,
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::H160;
    use serde_json::json;

    #[test]
    fn commit_request_wire_format() {
        let request = CommitRequest {
            order_hash: OrderHash([0x11; 32]),
            resolver: ChainAddress::Evm(H160([0x22; 20])),
            partial_amount: 60.into(),
            accepted_price: 1_000_000_000_000_000_000u128.into(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "orderHash": request.order_hash.to_string(),
                "resolver": { "evm": "0x2222222222222222222222222222222222222222" },
                "partialAmount": "60",
                "acceptedPrice": "1000000000000000000",
            }),
        );
        assert_eq!(serde_json::from_value::<CommitRequest>(value).unwrap(), request);
    }

    #[test]
    fn commit_response_wire_format() {
        let response = CommitResponse {
            success: true,
            order_hash: OrderHash([0x11; 32]),
            partial_amount: 60.into(),
            commitment_deadline: DateTime::UNIX_EPOCH + chrono::Duration::seconds(300),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["partialAmount"], json!("60"));
        assert_eq!(value["commitmentDeadline"], json!("1970-01-01T00:05:00Z"));
        assert_eq!(
            serde_json::from_value::<CommitResponse>(value).unwrap(),
            response
        );
    }

    #[test]
    fn ack_response_wire_format() {
        let ack = AckResponse {
            success: true,
            order_hash: OrderHash([0x33; 32]),
            status: OrderStatus::EscrowsReady,
        };
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["status"], json!("escrowsReady"));
    }
}
