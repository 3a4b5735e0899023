use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use compact_str::CompactString;
use numrent_sdk::objects::{CreateCodeRequest, RedeemRequest, RedeemResponse};

use super::ApiError;
use crate::state::AppState;

/// `POST /redeem`: refusals are a normal 200 response with `success: false`.
pub async fn redeem(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.redeem.redeem(request.user_id, &request.code).await?;
    Ok(Json(RedeemResponse::from(outcome)))
}

/// `POST /codes`
pub async fn create_code(
    State(state): State<AppState>,
    Json(request): Json<CreateCodeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .redeem
        .create_code(request.amount, request.scope, request.max_uses)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /codes/{code}`
pub async fn code_stats(
    State(state): State<AppState>,
    Path(code): Path<CompactString>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .redeem
        .get_code_stats(&code)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(stats))
}

/// `DELETE /codes/{code}`
pub async fn revoke_code(
    State(state): State<AppState>,
    Path(code): Path<CompactString>,
) -> Result<impl IntoResponse, ApiError> {
    if state.redeem.revoke_code(&code).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
