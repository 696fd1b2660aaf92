//! Event API endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::{error, success, ApiResult};
use crate::auth::AuthState;
use crate::errors::AppError;
use crate::models::{CreateEventRequest, Event, UpdateEventRequest};
use crate::AppState;

/// GET /api/events - List all events.
pub async fn list_events(State(state): State<AppState>) -> ApiResult<Vec<Event>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_events().await {
        Ok(events) => success(events, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/events/:id - Get a single event.
pub async fn get_event(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Event> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_event(&id).await {
        Ok(Some(event)) => success(event, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Event {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/events - Create a new event (admin).
pub async fn create_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Json(request): Json<CreateEventRequest>,
) -> ApiResult<Event> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let admin = match auth.require_admin() {
        Ok(identity) => identity,
        Err(e) => return error(e, revision_id),
    };

    if request.title.trim().is_empty() {
        return error(
            AppError::Validation("Title is required".to_string()),
            revision_id,
        );
    }

    match state.repo.create_event(&request).await {
        Ok(event) => {
            state.activity.log(
                &admin.uid,
                "Created Event",
                format!("Created event {} ({})", event.title, event.id),
            );
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(event, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/events/:id - Update an event (admin).
pub async fn update_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateEventRequest>,
) -> ApiResult<Event> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = auth.require_admin() {
        return error(e, revision_id);
    }
    if request.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return error(
            AppError::Validation("Title cannot be empty".to_string()),
            revision_id,
        );
    }

    match state.repo.update_event(&id, &request).await {
        Ok(event) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(event, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/events/:id - Delete an event (admin).
pub async fn delete_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let admin = match auth.require_admin() {
        Ok(identity) => identity,
        Err(e) => return error(e, revision_id),
    };

    match state.repo.delete_event(&id).await {
        Ok(()) => {
            state
                .activity
                .log(&admin.uid, "Deleted Event", format!("Deleted event {}", id));
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
