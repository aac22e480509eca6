use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::PageQuery;
use crate::api::schemas::messages::{AppendMessageRequest, PeerMessagesQuery};
use crate::domain::message::OfferPayload;
use crate::error::Result;
use crate::services::message_service::AppendRequest;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Messages of one conversation, oldest first.
///
/// # Errors
/// Returns `AppError::ConversationNotFound` or `AppError::Unauthorized`.
pub async fn list_for_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse> {
    let page = query.page(&state.config.pagination);
    let messages = state.message_service.list(id, &auth_user.user_id, page).await?;
    Ok(Json(messages))
}

/// Appends a message as the caller.
///
/// # Errors
/// Returns `AppError::InvalidOffer` if the attached offer is malformed.
/// Returns `AppError::InvalidArgument` if the content is empty or too long.
/// Returns `AppError::Unauthorized` if the caller is not a participant.
pub async fn append(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppendMessageRequest>,
) -> Result<impl IntoResponse> {
    let offer = payload.offer.map(OfferPayload::try_from).transpose()?;

    let message = state
        .message_service
        .append(AppendRequest {
            conversation_id: id,
            sender_id: auth_user.user_id,
            receiver_id: payload.receiver_id,
            content: payload.content,
            offer,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Messages between the caller and `peerId`, oldest first.
///
/// # Errors
/// Returns `AppError::NotFound` if the two have never talked.
pub async fn list_by_peer(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PeerMessagesQuery>,
) -> Result<impl IntoResponse> {
    let page = PageQuery { offset: query.offset, limit: query.limit }.page(&state.config.pagination);
    let messages = state.message_service.list_by_pair(&auth_user.user_id, &query.peer_id, page).await?;
    Ok(Json(messages))
}

/// # Errors
/// Returns `AppError::NotFound` for an unknown message.
/// Returns `AppError::Forbidden` if the caller did not send it.
pub async fn delete(auth_user: AuthUser, State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse> {
    state.message_service.delete(id, &auth_user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
