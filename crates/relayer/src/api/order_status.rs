use crate::{
    api::{error, internal_error_reply, AppState},
    coordinator::StatusError,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use model::{api::StatusResponse, order::OrderHash};
use std::sync::Arc;

pub async fn order_status_handler(
    State(state): State<Arc<AppState>>,
    Path(order_hash): Path<OrderHash>,
) -> Response {
    state
        .coordinator
        .order_status(&order_hash)
        .await
        .map(|order| {
            Json(StatusResponse {
                success: true,
                order,
            })
        })
        .into_response()
}

impl IntoResponse for StatusError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownOrder => {
                (StatusCode::NOT_FOUND, error("OrderNotFound", self.to_string())).into_response()
            }
            Self::UnsupportedChain(chain) => {
                tracing::error!(chain, "order references an unregistered chain");
                internal_error_reply()
            }
            Self::Chain(err) => {
                tracing::error!(?err, "chain error during order lookup");
                internal_error_reply()
            }
            Self::Storage(err) => {
                tracing::error!(?err, "database error during order lookup");
                internal_error_reply()
            }
        }
    }
}
