use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::PageQuery;
use crate::api::schemas::conversations::{CreateConversationRequest, UnreadCountResponse};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Returns the caller's conversation with `peerId`, creating it on first contact.
///
/// # Errors
/// Returns `AppError::InvalidParticipants` if the peer is blank or the caller.
pub async fn find_or_create(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse> {
    let conversation = state.conversation_service.find_or_create(&auth_user.user_id, &payload.peer_id).await?;
    Ok((StatusCode::OK, Json(conversation)))
}

/// Most recent activity first.
///
/// # Errors
/// Returns `AppError::Database` if the store fails.
pub async fn list(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = query.page(&state.config.pagination);
    let conversations = state.conversation_service.list_for_user(&auth_user.user_id, page).await?;
    Ok(Json(conversations))
}

/// # Errors
/// Returns `AppError::ConversationNotFound` or `AppError::Unauthorized`.
pub async fn get(auth_user: AuthUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    let conversation = state.conversation_service.get(id, &auth_user.user_id).await?;
    Ok(Json(conversation))
}

/// # Errors
/// Returns `AppError::ConversationNotFound` or `AppError::Unauthorized`.
pub async fn unread_count(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let unread = state.message_service.unread_count(id, &auth_user.user_id).await?;
    Ok(Json(UnreadCountResponse { conversation_id: id, unread }))
}
