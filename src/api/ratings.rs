use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::ratings::{SubmitRatingRequest, SubmitRatingResponse};
use crate::error::Result;
use axum::{Json, extract::State, response::IntoResponse};

/// Records or replaces the caller's rating of another user.
///
/// # Errors
/// Returns `AppError::InvalidRating` for self-ratings or values outside 1..=5.
/// Returns `AppError::NotFound` if the rated user is unknown.
pub async fn submit(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitRatingRequest>,
) -> Result<impl IntoResponse> {
    let (rating, aggregate) =
        state.rating_service.submit(&auth_user.user_id, &payload.rated_user_id, payload.value).await?;
    Ok(Json(SubmitRatingResponse { rating, aggregate }))
}
