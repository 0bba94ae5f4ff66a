//! Directory walks over the per-user media tree.
//!
//! Layout on disk: `<data_dir>/users/<user>/<tab>/...` with albums as nested
//! directories. A missing directory always yields an empty listing, never an
//! error; only a malformed relative path is rejected.

use std::path::{Component, Path};

use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::media::classify::{self, MediaKind};
use crate::media::thumbs::{self, Thumbnailer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Album,
    Image,
    Video,
}

/// One directory entry as served to clients. Built fresh on every listing;
/// `thumb` is present exactly for videos.
#[derive(Debug, Clone, Serialize)]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

impl MediaItem {
    pub fn album(name: String) -> Self {
        Self {
            kind: ItemKind::Album,
            name,
            url: None,
            thumb: None,
        }
    }

    pub fn image(name: String, url: String) -> Self {
        Self {
            kind: ItemKind::Image,
            name,
            url: Some(url),
            thumb: None,
        }
    }

    pub fn video(name: String, url: String, thumb: String) -> Self {
        Self {
            kind: ItemKind::Video,
            name,
            url: Some(url),
            thumb: Some(thumb),
        }
    }
}

/// A flattened media item tagged with its owners for the aggregated feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedEntry {
    #[serde(flatten)]
    pub item: MediaItem,
    pub user: String,
    pub tab: String,
}

/// Rejects relative paths that could escape the tab directory.
pub fn check_rel_path(rel: &str) -> AppResult<()> {
    let ok = !rel.contains('\\')
        && Path::new(rel)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid path: {rel}")))
    }
}

pub async fn list_users(config: &Config) -> Vec<String> {
    list_dirs(&config.users_dir()).await
}

pub async fn list_tabs(config: &Config, user: &str) -> Vec<String> {
    list_dirs(&config.users_dir().join(user)).await
}

async fn list_dirs(path: &Path) -> Vec<String> {
    let mut dirs = Vec::new();
    let Ok(mut rd) = tokio::fs::read_dir(path).await else {
        return dirs;
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    dirs.sort();
    dirs
}

/// What a tab holds, judged from its direct children (albums win over loose
/// files). A tab with a story document is always `story`.
pub async fn detect_tab_type(tab_path: &Path) -> &'static str {
    if tokio::fs::try_exists(tab_path.join(crate::story::store::STORY_FILE))
        .await
        .unwrap_or(false)
    {
        return "story";
    }

    let (mut has_image, mut has_video, mut has_album) = (false, false, false);
    let Ok(mut rd) = tokio::fs::read_dir(tab_path).await else {
        return "empty";
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if thumbs::is_sidecar(&name) {
            continue;
        }
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            has_album = true;
        } else {
            match classify::classify(&name) {
                MediaKind::Image => has_image = true,
                MediaKind::Video => has_video = true,
                MediaKind::Other => {}
            }
        }
    }

    match (has_album, has_image, has_video) {
        (true, _, _) => "albums",
        (false, true, false) => "images",
        (false, false, true) => "videos",
        (false, true, true) => "mixed",
        (false, false, false) => "empty",
    }
}

/// Recursive count of image/video leaves under a tab, sidecars excluded.
pub async fn count_media(tab_path: &Path) -> usize {
    let mut count = 0;
    let mut pending = vec![tab_path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(mut rd) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = rd.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if thumbs::is_sidecar(&name) {
                continue;
            }
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                pending.push(entry.path());
            } else if classify::classify(&name) != MediaKind::Other {
                count += 1;
            }
        }
    }
    count
}

fn file_url(user: &str, tab: &str, rel_entry: &str) -> String {
    format!("/files/users/{user}/{tab}/{rel_entry}")
}

/// Every image/video leaf under a tab, descending through all albums.
pub async fn walk_media(
    config: &Config,
    thumbs: &Thumbnailer,
    user: &str,
    tab: &str,
) -> Vec<MediaItem> {
    let tab_root = config.users_dir().join(user).join(tab);
    let mut items = Vec::new();
    // Explicit stack of album paths relative to the tab root.
    let mut pending = vec![String::new()];

    while let Some(rel_dir) = pending.pop() {
        let dir = if rel_dir.is_empty() {
            tab_root.clone()
        } else {
            tab_root.join(&rel_dir)
        };
        let Ok(mut rd) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = rd.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if thumbs::is_sidecar(&name) {
                continue;
            }
            let rel_entry = if rel_dir.is_empty() {
                name.clone()
            } else {
                format!("{rel_dir}/{name}")
            };
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                pending.push(rel_entry);
                continue;
            }
            match classify::classify(&name) {
                MediaKind::Image => items.push(MediaItem::image(name, file_url(user, tab, &rel_entry))),
                MediaKind::Video => {
                    let video_rel = format!("users/{user}/{tab}/{rel_entry}");
                    let thumb = thumbs.thumbnail_url(&video_rel).await;
                    items.push(MediaItem::video(name, file_url(user, tab, &rel_entry), thumb));
                }
                MediaKind::Other => {}
            }
        }
    }
    items
}

/// Immediate children of one directory level, paginated.
///
/// Ordering is deterministic (albums first, then case-insensitive name) so
/// consecutive pages partition the listing without gaps or duplicates. Clients
/// that want a randomized wall shuffle what they render. Thumbnails are only
/// resolved for the returned page.
pub async fn list_page(
    config: &Config,
    thumbs: &Thumbnailer,
    user: &str,
    tab: &str,
    rel_path: Option<&str>,
    offset: usize,
    limit: usize,
) -> AppResult<Vec<MediaItem>> {
    let mut dir = config.users_dir().join(user).join(tab);
    let mut rel_base = String::new();
    if let Some(rel) = rel_path {
        check_rel_path(rel)?;
        dir = dir.join(rel);
        rel_base = format!("{rel}/");
    }

    let Ok(mut rd) = tokio::fs::read_dir(&dir).await else {
        return Ok(Vec::new());
    };

    let mut entries: Vec<(bool, String, MediaKind)> = Vec::new();
    while let Ok(Some(entry)) = rd.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if thumbs::is_sidecar(&name) {
            continue;
        }
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        let kind = classify::classify(&name);
        if is_dir || kind != MediaKind::Other {
            entries.push((is_dir, name, kind));
        }
    }

    entries.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
    });

    let mut page = Vec::new();
    for (is_dir, name, kind) in entries.into_iter().skip(offset).take(limit) {
        if is_dir {
            page.push(MediaItem::album(name));
            continue;
        }
        let rel_entry = format!("{rel_base}{name}");
        match kind {
            MediaKind::Image => page.push(MediaItem::image(name, file_url(user, tab, &rel_entry))),
            MediaKind::Video => {
                let video_rel = format!("users/{user}/{tab}/{rel_entry}");
                let thumb = thumbs.thumbnail_url(&video_rel).await;
                page.push(MediaItem::video(name, file_url(user, tab, &rel_entry), thumb));
            }
            MediaKind::Other => {}
        }
    }
    Ok(page)
}
