use crate::{
    api::{error, internal_error_reply, AppState},
    coordinator::CreateSwapError,
};
use axum::{
    body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use model::{
    api::CreatedResponse,
    order::{OrderCreation, ValidationError},
};
use std::sync::Arc;

pub async fn create_swap_handler(
    State(state): State<Arc<AppState>>,
    body: body::Bytes,
) -> Response {
    let creation = match serde_json::from_slice::<OrderCreation>(&body) {
        Ok(creation) => creation,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, error("InvalidJson", err.to_string()))
                .into_response()
        }
    };

    state
        .coordinator
        .create_swap(creation)
        .await
        .map(|order_hash| {
            (
                StatusCode::CREATED,
                Json(CreatedResponse {
                    success: true,
                    order_hash,
                }),
            )
        })
        .inspect_err(|err| tracing::debug!(?err, "rejected order creation"))
        .into_response()
}

impl IntoResponse for CreateSwapError {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(err) => match err {
                ValidationError::WrongSigner(signer) => (
                    StatusCode::UNAUTHORIZED,
                    error(
                        "WrongSigner",
                        format!("signature recovers to {signer:?} instead of the maker"),
                    ),
                )
                    .into_response(),
                ValidationError::InvalidSignature => (
                    StatusCode::UNAUTHORIZED,
                    error("InvalidSignature", "the order signature is malformed"),
                )
                    .into_response(),
                other => {
                    (StatusCode::BAD_REQUEST, error("InvalidOrder", other.to_string()))
                        .into_response()
                }
            },
            Self::UnsupportedChain(chain) => (
                StatusCode::BAD_REQUEST,
                error("UnsupportedChain", format!("chain {chain} is not supported")),
            )
                .into_response(),
            Self::Duplicate => (
                StatusCode::CONFLICT,
                error("DuplicateOrder", "an order with this hash already exists"),
            )
                .into_response(),
            Self::Chain(err) => {
                tracing::error!(?err, "chain error during order creation");
                internal_error_reply()
            }
            Self::Storage(err) => {
                tracing::error!(?err, "database error during order creation");
                internal_error_reply()
            }
        }
    }
}
