use axum::{Json, extract::Path, extract::State, response::IntoResponse};
use numrent_core::notify::DispatchReport;
use numrent_sdk::objects::{AlertPayload, DepositPayload, OrderUpdatePayload};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::state::AppState;

/// Per-channel delivery flags.
#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    delivered: BTreeMap<&'static str, bool>,
}

impl From<DispatchReport> for NotifyResponse {
    fn from(report: DispatchReport) -> Self {
        Self {
            delivered: report.results.into_iter().collect(),
        }
    }
}

/// `POST /notify/deposit`
pub async fn deposit(
    State(state): State<AppState>,
    Json(payload): Json<DepositPayload>,
) -> impl IntoResponse {
    Json(NotifyResponse::from(state.notifier.deposit(payload).await))
}

/// `POST /notify/order`
pub async fn order(
    State(state): State<AppState>,
    Json(payload): Json<OrderUpdatePayload>,
) -> impl IntoResponse {
    Json(NotifyResponse::from(state.notifier.order_update(payload).await))
}

/// `POST /notify/alert`
pub async fn alert(
    State(state): State<AppState>,
    Json(payload): Json<AlertPayload>,
) -> impl IntoResponse {
    Json(NotifyResponse::from(state.notifier.alert_payload(payload).await))
}

/// `POST /notify/metrics/{user_id}`
pub async fn metrics(State(state): State<AppState>, Path(user_id): Path<i64>) -> impl IntoResponse {
    Json(NotifyResponse::from(state.notifier.user_metrics(user_id).await))
}
