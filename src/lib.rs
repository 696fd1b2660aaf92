//! LUG Community Site Backend
//!
//! REST + server-sent-events backend for the club site: forum chat, events,
//! council listing, profiles and the admin dashboard, on SQLite.
//!
//! The realtime pieces ([`feed::MessageFeed`], [`analytics::AnalyticsAggregator`],
//! [`auth::AuthContext`]) are usable on their own; [`create_router`] wires them
//! into the HTTP API.

pub mod activity;
pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod feed;
pub mod models;
pub mod nav;
pub mod storage;
pub mod submission;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use activity::ActivityLog;
use analytics::{AnalyticsAggregator, AnalyticsReport};
use auth::{AuthPolicy, TokenVerifier};
use config::Config;
use db::Repository;
use feed::{FeedView, MessageFeed};
use storage::{BlobStore, BLOB_ROUTE};
use submission::Submitter;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub config: Arc<Config>,
    pub verifier: Arc<TokenVerifier>,
    pub policy: Arc<AuthPolicy>,
    pub activity: ActivityLog,
    pub submitter: Submitter,
    /// Live view of the message feed
    pub feed: watch::Receiver<FeedView>,
    /// Live analytics report
    pub analytics: watch::Receiver<AnalyticsReport>,
}

/// Wire handlers to the repository and the live views.
pub fn build_state(
    config: Config,
    repo: Repository,
    feed: &MessageFeed,
    analytics: &AnalyticsAggregator,
) -> AppState {
    let blobs = BlobStore::new(
        &config.blob_dir,
        &config.public_base_url,
        config.max_upload_bytes,
    );
    let activity = ActivityLog::new(repo.clone());
    let submitter = Submitter::new(repo.clone(), blobs, activity.clone());
    let policy = AuthPolicy {
        privileged_email: config.admin_email.clone(),
        hosted_domain: config.hosted_domain.clone(),
    };

    AppState {
        verifier: Arc::new(TokenVerifier::new(&config.token_secret)),
        policy: Arc::new(policy),
        activity,
        submitter,
        feed: feed.watch(),
        analytics: analytics.watch(),
        config: Arc::new(config),
        repo,
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let verifier = state.verifier.clone();
    let policy = state.policy.clone();

    // Base64 inflates the payload by a third, plus JSON framing.
    let image_body_limit = state.config.max_upload_bytes / 3 * 4 + 4096;

    // API routes
    let api_routes = Router::new()
        // Auth
        .route("/auth/signin", post(api::sign_in))
        .route("/auth/signout", post(api::sign_out))
        // Site chrome
        .route("/site", get(api::get_site))
        // Forum
        .route("/messages", get(api::list_messages).post(api::post_message))
        .route("/messages/stream", get(api::stream_messages))
        .route(
            "/messages/image",
            post(api::post_image).layer(DefaultBodyLimit::max(image_body_limit)),
        )
        // Events
        .route("/events", get(api::list_events).post(api::create_event))
        .route(
            "/events/{id}",
            get(api::get_event)
                .put(api::update_event)
                .delete(api::delete_event),
        )
        // Profile and council
        .route("/profile", get(api::get_profile).put(api::update_profile))
        .route("/council", get(api::list_council))
        // Admin
        .route("/admin/analytics", get(api::get_analytics))
        .route("/admin/users", get(api::list_users))
        .route("/admin/activity", get(api::list_activity))
        .route(
            "/admin/council/{id}",
            put(api::assign_council).delete(api::remove_council),
        )
        // Resolve the caller's session
        .layer(middleware::from_fn(move |req, next| {
            auth::identity_layer(verifier.clone(), policy.clone(), req, next)
        }));

    // Health check and uploaded images (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .nest_service(BLOB_ROUTE, ServeDir::new(&state.config.blob_dir));

    Router::new()
        .nest("/api", api_routes)
        .merge(public_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
