use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookgarden_api::{
    config::Config,
    create_router,
    db::{create_pool, create_redis_client, run_migrations, Cache, InMemoryStore, PgStore, Stores},
    services::{recommendation::RecommendationOrchestrator, RecommendationService},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookgarden_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let stores = match &config.database_url {
        Some(database_url) => {
            let pool = create_pool(database_url).await?;
            run_migrations(&pool).await?;
            tracing::info!("Using PostgreSQL store");
            Stores::from_backend(Arc::new(PgStore::new(pool)))
        }
        None => {
            let store = match &config.seed_path {
                Some(path) => InMemoryStore::load_seed(path)?,
                None => InMemoryStore::new(),
            };
            tracing::info!("Using in-memory store");
            Stores::from_backend(Arc::new(store))
        }
    };

    let orchestrator = Arc::new(RecommendationOrchestrator::new(
        stores.clone(),
        config.recommendation_settings(),
    ));
    let mut recommendations = RecommendationService::new(orchestrator);

    let cache_writer = match &config.redis_url {
        Some(redis_url) => {
            let (cache, handle) = Cache::new(create_redis_client(redis_url)?);
            recommendations = recommendations.with_cache(cache, config.recommendation_cache_ttl);
            tracing::info!(ttl = config.recommendation_cache_ttl, "Recommendation cache enabled");
            Some(handle)
        }
        None => None,
    };

    let app = create_router(AppState::new(stores, recommendations));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
