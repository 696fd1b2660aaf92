//! Sign-in and sign-out endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::models::{NewUser, User};
use crate::nav::Navigation;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub user: User,
    pub is_admin: bool,
    pub redirect: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub redirect: &'static str,
}

/// POST /api/auth/signin - Exchange an identity token for the user record.
///
/// The record is created on first sign-in.
pub async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<SignInResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let auth = match state
        .verifier
        .verify(&request.id_token)
        .and_then(|identity| state.policy.admit(identity))
    {
        Ok(auth) => auth,
        Err(e) => {
            tracing::warn!("Error during sign-in: {}", e);
            return error(e, revision_id);
        }
    };
    let is_admin = auth.is_admin();
    let Some(identity) = auth.identity() else {
        return error(
            crate::errors::AppError::Internal("Sign-in resolved no identity".to_string()),
            revision_id,
        );
    };

    let new_user = NewUser {
        id: identity.uid.clone(),
        name: identity
            .display_name
            .clone()
            .unwrap_or_else(|| identity.email.clone()),
        email: identity.email.clone(),
        photo_url: identity.photo_url.clone().unwrap_or_default(),
        is_admin,
    };

    match state.repo.ensure_user(&new_user).await {
        Ok((user, created)) => {
            if created {
                tracing::info!(user_id = %user.id, "New user signed up");
            }
            state
                .activity
                .log(&user.id, "Signed In", format!("Signed in as {}", user.email));

            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(
                SignInResponse {
                    user,
                    is_admin,
                    redirect: Navigation::Profile.path(),
                },
                new_revision,
            )
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/auth/signout - Tell the client where to go after dropping its token.
pub async fn sign_out(State(state): State<AppState>) -> ApiResult<RedirectResponse> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
    success(
        RedirectResponse {
            redirect: Navigation::Home.path(),
        },
        revision_id,
    )
}
