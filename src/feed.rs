//! The aggregated feed: every tab of every user plus the shared pools,
//! reshuffled on every request. The feed is an endless random sampler by
//! contract; there is no stable cursor, and a page shorter than `limit`
//! signals the end.

use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    routing::get,
};
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::media::classify::{self, MediaKind};
use crate::media::thumbs::{self, Thumbnailer};
use crate::media::walker::{self, FeedEntry, ItemKind, MediaItem};
use crate::{AppResult, AppState, Config};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/feed", get(api_feed))
        .route("/api/interfaith", get(api_interfaith))
        .route("/api/tiktok", get(api_tiktok))
}

#[derive(Deserialize)]
struct PageQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    30
}

/// Single-level listing of one of the shared pools (`interfaith`, `videos`).
async fn pool_media(config: &Config, thumbs: &Thumbnailer, pool: &str) -> Vec<MediaItem> {
    let mut items = Vec::new();
    let Ok(mut rd) = tokio::fs::read_dir(config.data_dir.join(pool)).await else {
        return items;
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if thumbs::is_sidecar(&name) {
            continue;
        }
        let url = format!("/files/{pool}/{name}");
        match classify::classify(&name) {
            MediaKind::Image => items.push(MediaItem::image(name, url)),
            MediaKind::Video => {
                let thumb = thumbs.thumbnail_url(&format!("{pool}/{name}")).await;
                items.push(MediaItem::video(name, url, thumb));
            }
            MediaKind::Other => {}
        }
    }
    items
}

/// Flattens all user media plus the shared pools into one unordered pile.
pub async fn collect_feed(config: &Config, thumbs: &Thumbnailer) -> Vec<FeedEntry> {
    let mut feed = Vec::new();

    for user in walker::list_users(config).await {
        for tab in walker::list_tabs(config, &user).await {
            for item in walker::walk_media(config, thumbs, &user, &tab).await {
                feed.push(FeedEntry {
                    item,
                    user: user.clone(),
                    tab: tab.clone(),
                });
            }
        }
    }

    // Shared pools appear under their own pseudo-owner.
    for pool in ["interfaith", "videos"] {
        for item in pool_media(config, thumbs, pool).await {
            feed.push(FeedEntry {
                item,
                user: pool.to_owned(),
                tab: pool.to_owned(),
            });
        }
    }

    feed
}

#[debug_handler(state = AppState)]
async fn api_feed(
    Query(PageQuery { offset, limit }): Query<PageQuery>,
    State(config): State<Arc<Config>>,
    State(thumbs): State<Thumbnailer>,
) -> AppResult<Json<Vec<FeedEntry>>> {
    let mut feed = collect_feed(&config, &thumbs).await;
    feed.shuffle(&mut rand::rng());
    let page: Vec<FeedEntry> = feed.into_iter().skip(offset).take(limit).collect();
    Ok(Json(page))
}

#[debug_handler(state = AppState)]
async fn api_interfaith(
    Query(PageQuery { offset, limit }): Query<PageQuery>,
    State(config): State<Arc<Config>>,
    State(thumbs): State<Thumbnailer>,
) -> AppResult<Json<Vec<MediaItem>>> {
    let items = pool_media(&config, &thumbs, "interfaith").await;
    Ok(Json(items.into_iter().skip(offset).take(limit).collect()))
}

/// Shuffled video URLs from the shared pools.
#[debug_handler(state = AppState)]
async fn api_tiktok(
    Query(PageQuery { offset, limit }): Query<PageQuery>,
    State(config): State<Arc<Config>>,
    State(thumbs): State<Thumbnailer>,
) -> AppResult<Json<Vec<String>>> {
    let mut urls = Vec::new();
    for pool in ["interfaith", "videos"] {
        for item in pool_media(&config, &thumbs, pool).await {
            if item.kind == ItemKind::Video {
                urls.extend(item.url);
            }
        }
    }
    urls.shuffle(&mut rand::rng());
    Ok(Json(urls.into_iter().skip(offset).take(limit).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[tokio::test]
    async fn feed_spans_users_tabs_and_pools() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::for_tests(tmp.path());
        let thumbs = Thumbnailer::new(tmp.path().to_path_buf());

        touch(&tmp.path().join("users/alice/trip/a.jpg"));
        touch(&tmp.path().join("users/alice/trip/deep/b.png"));
        touch(&tmp.path().join("users/bob/art/c.webp"));
        touch(&tmp.path().join("interfaith/d.jpg"));
        touch(&tmp.path().join("videos/e.png"));
        touch(&tmp.path().join("videos/skip.txt"));

        let feed = collect_feed(&config, &thumbs).await;
        assert_eq!(feed.len(), 5);

        let alice: Vec<&FeedEntry> = feed.iter().filter(|e| e.user == "alice").collect();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|e| e.tab == "trip"));

        let pool = feed.iter().find(|e| e.user == "interfaith").unwrap();
        assert_eq!(pool.item.url.as_deref(), Some("/files/interfaith/d.jpg"));
    }

    #[tokio::test]
    async fn empty_data_dir_gives_empty_feed() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::for_tests(tmp.path());
        let thumbs = Thumbnailer::new(tmp.path().to_path_buf());
        assert!(collect_feed(&config, &thumbs).await.is_empty());
    }
}
