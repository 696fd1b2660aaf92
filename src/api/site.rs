//! Site chrome endpoint: feature flags and navigation for the caller.

use axum::{extract::State, Extension};
use serde::Serialize;

use super::{success, ApiResult};
use crate::auth::AuthState;
use crate::config::FeatureFlags;
use crate::nav::{nav_links, show_sign_in_button, NavLink};
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub feature_flags: FeatureFlags,
    pub nav_links: Vec<NavLink>,
    pub show_sign_in_button: bool,
    pub signed_in: bool,
    pub is_admin: bool,
}

/// GET /api/site - Flags and header links as seen by the caller.
pub async fn get_site(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthState>,
) -> ApiResult<SiteInfo> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    let flags = state.config.feature_flags;

    success(
        SiteInfo {
            feature_flags: flags,
            nav_links: nav_links(&flags, &auth),
            show_sign_in_button: show_sign_in_button(&flags, &auth),
            signed_in: auth.identity().is_some(),
            is_admin: auth.is_admin(),
        },
        revision_id,
    )
}
