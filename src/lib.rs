pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod interact;
pub mod media;
pub mod session;
pub mod story;
pub mod users;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

pub use config::Config;
pub use error::{AppError, AppResult};

use media::thumbs::Thumbnailer;
use story::store::StoryStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<Config>,
    pub stories: StoryStore,
    pub thumbs: Thumbnailer,
}
