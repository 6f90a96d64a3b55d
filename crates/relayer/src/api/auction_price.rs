use crate::api::AppState;
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
};
use model::order::OrderHash;
use std::sync::Arc;

pub async fn auction_price_handler(
    State(state): State<Arc<AppState>>,
    Path(order_hash): Path<OrderHash>,
) -> Response {
    state
        .coordinator
        .auction_price(&order_hash)
        .await
        .map(Json)
        .into_response()
}
