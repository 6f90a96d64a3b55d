use crate::api::{internal_error_reply, AppState};
use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
};
use model::api::ActiveOrdersResponse;
use std::sync::Arc;

pub async fn active_orders_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.coordinator.active_orders().await {
        Ok(orders) => Json(ActiveOrdersResponse {
            success: true,
            orders,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(?err, "database error listing active orders");
            internal_error_reply()
        }
    }
}
