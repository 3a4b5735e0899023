//! Internal HTTP API.
//!
//! Bound to an internal address and called by the storefront backend;
//! authentication is left to the network boundary.
//!
//! # Endpoints
//!
//! - `POST   /notify/deposit`            – deposit state change
//! - `POST   /notify/order`              – rental order state change
//! - `POST   /notify/alert`              – operator or user alert
//! - `POST   /notify/metrics/{user_id}`  – refresh a user's dashboard
//! - `POST   /redeem`                    – redeem a code for a user
//! - `POST   /codes`                     – create a code
//! - `GET    /codes/{code}`              – code statistics
//! - `DELETE /codes/{code}`              – revoke a code

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use numrent_core::redeem::RedeemError;

use crate::state::AppState;

mod notify;
mod redeem;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notify/deposit", post(notify::deposit))
        .route("/notify/order", post(notify::order))
        .route("/notify/alert", post(notify::alert))
        .route("/notify/metrics/{user_id}", post(notify::metrics))
        .route("/redeem", post(redeem::redeem))
        .route("/codes", post(redeem::create_code))
        .route(
            "/codes/{code}",
            get(redeem::code_stats).delete(redeem::revoke_code),
        )
}

/// Errors that can occur in API handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    /// A backing store failed.
    Redeem(RedeemError),
    /// The requested code was not found.
    NotFound,
}

impl From<RedeemError> for ApiError {
    fn from(e: RedeemError) -> Self {
        ApiError::Redeem(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Redeem(RedeemError::InvalidRequest(reason)) => {
                (StatusCode::BAD_REQUEST, reason).into_response()
            }
            ApiError::Redeem(e) => {
                tracing::error!(error = %e, "Redeem API error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "code not found").into_response(),
        }
    }
}
