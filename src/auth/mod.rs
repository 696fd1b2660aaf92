//! Authentication module.
//!
//! Identity tokens are verified on every request; the resolved
//! [`AuthState`] is attached to the request for handlers to inspect.

mod session;
mod token;

pub use session::*;
pub use token::*;

#[cfg(test)]
pub(crate) use token::test_support;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::{AppError, AppErrorWithRevision};

/// Auth layer function that resolves the caller's session from a bearer token.
///
/// Requests without a token continue as `Anonymous`; a token that does not
/// verify is rejected outright.
pub async fn identity_layer(
    verifier: Arc<TokenVerifier>,
    policy: Arc<AuthPolicy>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).trim().to_string());

    let state = match bearer {
        None => AuthState::Anonymous,
        Some(token) if token.is_empty() => AuthState::Anonymous,
        Some(token) => match verifier.verify(&token).and_then(|id| policy.admit(id)) {
            Ok(state) => state,
            Err(e) => return unauthorized_response(e),
        },
    };

    request.extensions_mut().insert(state);
    next.run(request).await
}

/// Create an unauthorized response.
fn unauthorized_response(error: AppError) -> Response {
    let error = match error {
        AppError::Unauthorized(_) => error,
        other => AppError::Unauthorized(other.message()),
    };
    AppErrorWithRevision::new(error, 0).into_response()
}
