use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::PageQuery;
use crate::api::schemas::offers::{OfferListQuery, OpenOfferRequest, SetStatusRequest};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Opens a pending offer on a listing as the caller.
///
/// # Errors
/// Returns `AppError::InvalidArgument` for a negative price or a self-offer.
/// Returns `AppError::NotFound` if the listing does not exist.
pub async fn open(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<OpenOfferRequest>,
) -> Result<impl IntoResponse> {
    let offer =
        state.offer_service.open(&payload.listing_id, &auth_user.user_id, payload.message, payload.price).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// # Errors
/// Returns `AppError::Database` if the store fails.
pub async fn list(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<OfferListQuery>,
) -> Result<impl IntoResponse> {
    let page = PageQuery { offset: query.offset, limit: query.limit }.page(&state.config.pagination);
    let offers = state.offer_service.list(&query.filter(), page).await?;
    Ok(Json(offers))
}

/// # Errors
/// Returns `AppError::InvalidArgument` for an unknown status.
/// Returns `AppError::Forbidden` unless the caller owns the listing.
/// Returns `AppError::InvalidTransition` when the offer is already decided.
pub async fn set_status(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<impl IntoResponse> {
    let next = payload.status()?;
    let offer = state.offer_service.set_status(id, &auth_user.user_id, next).await?;
    Ok(Json(offer))
}
