use crate::{
    api::{error, internal_error_reply, AppState},
    coordinator::CommitError,
};
use axum::{
    body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use model::api::{CommitRequest, CommitResponse};
use std::sync::Arc;

pub async fn commit_resolver_handler(
    State(state): State<Arc<AppState>>,
    body: body::Bytes,
) -> Response {
    let request = match serde_json::from_slice::<CommitRequest>(&body) {
        Ok(request) => request,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, error("InvalidJson", err.to_string()))
                .into_response()
        }
    };

    state
        .coordinator
        .commit_resolver(
            request.order_hash,
            request.resolver,
            request.partial_amount,
            request.accepted_price,
        )
        .await
        .map(|commitment| {
            Json(CommitResponse {
                success: true,
                order_hash: commitment.order_hash,
                partial_amount: commitment.partial_amount,
                commitment_deadline: commitment.deadline,
            })
        })
        .inspect_err(|err| tracing::debug!(?err, "rejected commitment"))
        .into_response()
}

impl IntoResponse for CommitError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownOrder => {
                (StatusCode::NOT_FOUND, error("OrderNotFound", self.to_string())).into_response()
            }
            Self::NotCommittable(_) | Self::AlreadyCommitted => {
                (StatusCode::CONFLICT, error("AlreadyCommitted", self.to_string())).into_response()
            }
            Self::InsufficientRemaining => (
                StatusCode::CONFLICT,
                error("InsufficientRemaining", self.to_string()),
            )
                .into_response(),
            Self::OrderExpired => {
                (StatusCode::BAD_REQUEST, error("OrderExpired", self.to_string())).into_response()
            }
            Self::ZeroAmount => {
                (StatusCode::BAD_REQUEST, error("ZeroAmount", self.to_string())).into_response()
            }
            Self::InvalidPrice => {
                (StatusCode::BAD_REQUEST, error("InvalidPrice", self.to_string())).into_response()
            }
            Self::UnsupportedChain(chain) => {
                tracing::error!(chain, "committed order references an unregistered chain");
                internal_error_reply()
            }
            Self::Chain(err) => {
                tracing::error!(?err, "chain error during commit");
                internal_error_reply()
            }
            Self::Storage(err) => {
                tracing::error!(?err, "database error during commit");
                internal_error_reply()
            }
        }
    }
}
