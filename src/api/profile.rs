//! Profile and council endpoints.

use axum::{extract::State, Extension, Json};

use super::{error, success, ApiResult};
use crate::auth::AuthState;
use crate::errors::AppError;
use crate::models::{CouncilMember, UpdateProfileRequest, User};
use crate::AppState;

/// GET /api/profile - The caller's user record.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let identity = match auth.require_user() {
        Ok(identity) => identity,
        Err(e) => return error(e, revision_id),
    };

    match state.repo.get_user(&identity.uid).await {
        Ok(Some(user)) => success(user, revision_id),
        Ok(None) => error(
            AppError::NotFound("No profile yet; sign in first".to_string()),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/profile - Edit the caller's name, photo or description.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let identity = match auth.require_user() {
        Ok(identity) => identity,
        Err(e) => return error(e, revision_id),
    };

    if request.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return error(
            AppError::Validation("Name cannot be empty".to_string()),
            revision_id,
        );
    }

    match state.repo.update_profile(&identity.uid, &request).await {
        Ok(user) => {
            state
                .activity
                .log(&user.id, "Updated Profile", "Edited profile details".to_string());
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/council - Current council members.
pub async fn list_council(State(state): State<AppState>) -> ApiResult<Vec<CouncilMember>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_users().await {
        Ok(users) => success(
            users
                .into_iter()
                .filter_map(|u| CouncilMember::try_from(u).ok())
                .collect(),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}
