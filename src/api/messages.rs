//! Forum message endpoints.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Extension, Json,
};
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;

use super::{error, success, ApiResult};
use crate::auth::AuthState;
use crate::errors::{AppError, AppErrorWithRevision};
use crate::feed::FeedView;
use crate::models::{ChatMessage, PostImageRequest, PostMessageRequest};
use crate::submission::Submitted;
use crate::AppState;

/// GET /api/messages - Current ordered feed.
pub async fn list_messages(State(state): State<AppState>) -> ApiResult<FeedView> {
    let view = state.feed.borrow().clone();
    let revision_id = view.revision_id;
    success(view, revision_id)
}

/// GET /api/messages/stream - One `snapshot` event per feed replacement.
pub async fn stream_messages(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = WatchStream::new(state.feed.clone()).map(|view| {
        let event = SseEvent::default()
            .event("snapshot")
            .id(view.revision_id.to_string());
        Ok(match event.json_data(&view) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!("Failed to encode feed snapshot: {}", e);
                SseEvent::default().event("error").data("snapshot encoding failed")
            }
        })
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// POST /api/messages - Post a text message.
pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Json(request): Json<PostMessageRequest>,
) -> ApiResult<ChatMessage> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let outcome = state.submitter.submit_text(&auth, &request.text).await;
    respond(&state, outcome, revision_id).await
}

/// POST /api/messages/image - Post an image given as a data URI.
pub async fn post_image(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Json(request): Json<PostImageRequest>,
) -> ApiResult<ChatMessage> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let outcome = state.submitter.submit_image(&auth, &request.data_uri).await;
    respond(&state, outcome, revision_id).await
}

async fn respond(
    state: &AppState,
    outcome: Result<Submitted, AppError>,
    revision_id: i64,
) -> ApiResult<ChatMessage> {
    match outcome {
        Ok(Submitted::Posted(message)) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(message, new_revision)
        }
        Ok(Submitted::Redirect(target)) => Err(AppErrorWithRevision {
            error: AppError::Unauthorized("Sign in to post in the forum".to_string()),
            revision_id,
            details: Some(serde_json::json!({ "redirect": target.path() })),
        }),
        Err(e) => error(e, revision_id),
    }
}
