//! LUG site backend server.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lug_site_backend::analytics::AnalyticsAggregator;
use lug_site_backend::config::Config;
use lug_site_backend::db::{self, Repository};
use lug_site_backend::feed::MessageFeed;
use lug_site_backend::{build_state, create_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LUG site backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Blob directory: {:?}", config.blob_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.token_secret == "dev-insecure-secret" {
        tracing::warn!("LUG_TOKEN_SECRET is not set; identity tokens use the development secret!");
    }
    if config.hosted_domain.is_none() {
        tracing::warn!("LUG_HOSTED_DOMAIN disabled; any account can sign in");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool);

    // Standing subscriptions, released on shutdown
    let feed = MessageFeed::open(&repo).await?;
    let analytics = AnalyticsAggregator::open(&repo, config.analytics_refresh).await?;

    let state = build_state(config.clone(), repo, &feed, &analytics);
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    feed.close();
    analytics.close();
    tracing::info!("Shut down cleanly");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
