use crate::{
    api::{error, internal_error_reply, AppState},
    coordinator::EscrowsReadyError,
};
use axum::{
    body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use model::api::{AckResponse, EscrowsReadyRequest};
use std::sync::Arc;

pub async fn escrows_ready_handler(
    State(state): State<Arc<AppState>>,
    body: body::Bytes,
) -> Response {
    let request = match serde_json::from_slice::<EscrowsReadyRequest>(&body) {
        Ok(request) => request,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, error("InvalidJson", err.to_string()))
                .into_response()
        }
    };

    let order_hash = request.order_hash;
    state
        .coordinator
        .escrows_ready(
            request.order_hash,
            request.resolver,
            request.src_escrow,
            request.dst_escrow,
        )
        .await
        .map(|status| {
            Json(AckResponse {
                success: true,
                order_hash,
                status,
            })
        })
        .inspect_err(|err| tracing::debug!(?err, "rejected escrow proof"))
        .into_response()
}

impl IntoResponse for EscrowsReadyError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownOrder => {
                (StatusCode::NOT_FOUND, error("OrderNotFound", self.to_string())).into_response()
            }
            Self::UnknownCommitment => (
                StatusCode::NOT_FOUND,
                error("CommitmentNotFound", self.to_string()),
            )
                .into_response(),
            Self::AlreadyReady => {
                (StatusCode::CONFLICT, error("AlreadyReady", self.to_string())).into_response()
            }
            Self::MissingEscrow(escrow) => (
                StatusCode::BAD_REQUEST,
                error("EscrowNotFound", format!("no escrow {escrow} on chain")),
            )
                .into_response(),
            Self::SrcEscrow(_) | Self::DstEscrow(_) => {
                (StatusCode::BAD_REQUEST, error("EscrowMismatch", self.to_string()))
                    .into_response()
            }
            Self::InvalidTimelock => {
                (StatusCode::BAD_REQUEST, error("InvalidTimelock", self.to_string()))
                    .into_response()
            }
            Self::UnsupportedChain(chain) => {
                tracing::error!(chain, "order references an unregistered chain");
                internal_error_reply()
            }
            Self::Chain(err) => {
                tracing::error!(?err, "chain error during escrow verification");
                internal_error_reply()
            }
            Self::Storage(err) => {
                tracing::error!(?err, "database error during escrow verification");
                internal_error_reply()
            }
        }
    }
}
