use std::sync::Arc;

use tidepool::{AppState, Config, db, feed, interact, media, story, users};

use axum::Router;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

use media::thumbs::Thumbnailer;
use story::store::StoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(Config::from_env());
    tokio::fs::create_dir_all(config.users_dir()).await?;

    let db_pool = db::connect(&config.database_url).await?;
    // Schema must exist before the first request, not be checked on each one.
    db::init(&db_pool).await?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    let app_state = AppState {
        db_pool,
        stories: StoryStore::new(config.users_dir()),
        thumbs: Thumbnailer::new(config.data_dir.clone()),
        config: config.clone(),
    };

    let app = Router::new()
        .merge(users::router())
        .merge(media::router())
        .merge(feed::router())
        .merge(story::router())
        .merge(interact::router())
        .nest_service("/files", ServeDir::new(&config.data_dir))
        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "tidepool listening");
    axum::serve(listener, app).await?;
    Ok(())
}
