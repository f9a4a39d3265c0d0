use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedstash::config::Config;
use feedstash::db::Database;
use feedstash::fetcher::{start_background_refresh, Fetcher};
use feedstash::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feedstash=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("FEEDSTASH_CONFIG").unwrap_or_else(|_| "feedstash.toml".to_string());
    let config = Config::load_or_default(&config_path)?
        .with_redis_url(std::env::var("REDIS_URL").ok());
    info!(
        "Loaded {} sources from {}",
        config.sources.len(),
        config_path
    );

    let db = Arc::new(Database::connect(&config.storage).await?);
    info!("Storage ready ({:?} backend)", config.storage.backend);

    let fetcher = Arc::new(Fetcher::new(db.clone(), config.sources.clone())?);

    if config.refresh_interval > 0 && !config.sources.is_empty() {
        let bg_fetcher = fetcher.clone();
        let refresh_interval = config.refresh_interval;
        tokio::spawn(async move {
            start_background_refresh(bg_fetcher, refresh_interval).await;
        });
    }

    let state = Arc::new(AppState {
        db: db.clone(),
        fetcher: fetcher.clone(),
    });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!("Server starting on http://{}", config.listen);

    axum::serve(listener, app).await?;

    Ok(())
}
