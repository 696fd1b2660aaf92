//! Admin dashboard endpoints.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::analytics::AnalyticsReport;
use crate::auth::AuthState;
use crate::errors::AppError;
use crate::models::{ActivityEntry, CouncilAssignment, User};
use crate::AppState;

/// Activity query parameters.
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    /// Maximum number of entries (default: 50, capped at 500).
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// GET /api/admin/analytics - Daily counts for the last 30 days.
pub async fn get_analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
) -> ApiResult<AnalyticsReport> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = auth.require_admin() {
        return error(e, revision_id);
    }

    let report = state.analytics.borrow().clone();
    success(report, revision_id)
}

/// GET /api/admin/users - All users.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
) -> ApiResult<Vec<User>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = auth.require_admin() {
        return error(e, revision_id);
    }

    match state.repo.list_users().await {
        Ok(users) => success(users, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/admin/activity - Recent activity, newest first.
pub async fn list_activity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Query(query): Query<ActivityQuery>,
) -> ApiResult<Vec<ActivityEntry>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = auth.require_admin() {
        return error(e, revision_id);
    }

    match state.repo.list_activity(query.limit.clamp(1, 500)).await {
        Ok(entries) => success(entries, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/admin/council/:id - Assign a council role.
pub async fn assign_council(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Path(id): Path<String>,
    Json(request): Json<CouncilAssignment>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let admin = match auth.require_admin() {
        Ok(identity) => identity,
        Err(e) => return error(e, revision_id),
    };

    if request.council_role.trim().is_empty() || request.council_department.trim().is_empty() {
        return error(
            AppError::Validation("Council role and department are required".to_string()),
            revision_id,
        );
    }

    match state.repo.set_council_membership(&id, Some(&request)).await {
        Ok(user) => {
            state.activity.log(
                &admin.uid,
                "Assigned Council Role",
                format!("{} is now {}", user.id, request.council_role),
            );
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/admin/council/:id - Remove someone from the council.
pub async fn remove_council(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
    Path(id): Path<String>,
) -> ApiResult<User> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if let Err(e) = auth.require_admin() {
        return error(e, revision_id);
    }

    match state.repo.set_council_membership(&id, None).await {
        Ok(user) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(user, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
