use crate::{
    api::{error, internal_error_reply, AppState},
    coordinator::CompletionError,
};
use axum::{
    body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use model::api::{AckResponse, CompletionRequest};
use std::sync::Arc;

pub async fn notify_completion_handler(
    State(state): State<Arc<AppState>>,
    body: body::Bytes,
) -> Response {
    let request = match serde_json::from_slice::<CompletionRequest>(&body) {
        Ok(request) => request,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, error("InvalidJson", err.to_string()))
                .into_response()
        }
    };

    state
        .coordinator
        .notify_completion(request.order_hash, request.resolver)
        .await
        .map(|status| {
            Json(AckResponse {
                success: true,
                order_hash: request.order_hash,
                status,
            })
        })
        .inspect_err(|err| tracing::debug!(?err, "rejected completion"))
        .into_response()
}

impl IntoResponse for CompletionError {
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
            Self::EscrowsNotReady => {
                (StatusCode::CONFLICT, error("EscrowsNotReady", self.to_string())).into_response()
            }
            Self::SrcNotWithdrawn => (
                StatusCode::CONFLICT,
                error("SrcEscrowNotWithdrawn", self.to_string()),
            )
                .into_response(),
            Self::MissingEscrow(escrow) => (
                StatusCode::BAD_REQUEST,
                error("EscrowNotFound", format!("no escrow {escrow} on chain")),
            )
                .into_response(),
            Self::UnsupportedChain(chain) => {
                tracing::error!(chain, "order references an unregistered chain");
                internal_error_reply()
            }
            Self::Chain(err) => {
                tracing::error!(?err, "chain error during completion");
                internal_error_reply()
            }
            Self::Storage(err) => {
                tracing::error!(?err, "database error during completion");
                internal_error_reply()
            }
        }
    }
}
