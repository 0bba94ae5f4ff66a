pub mod classify;
pub mod thumbs;
pub mod walker;

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Json, Router, debug_handler,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::header::CONTENT_TYPE,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::story::store::StoryStore;
use crate::{AppError, AppResult, AppState, Config};
use thumbs::Thumbnailer;
use walker::MediaItem;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/profile/{username}", get(profile_summary))
        .route("/api/profile/{username}/add_tab", post(add_tab))
        .route("/api/profile/{username}/{tab}/media", get(tab_media))
        .route("/api/profile/{username}/{tab}/album", get(album_media))
        .route("/api/profile/{username}/{tab}/files", get(tab_files))
        .route("/api/profile/{username}/{tab}/upload", post(upload))
        .route("/api/profile/{username}/{tab}/delete_album", delete(delete_album))
        .route("/api/profile/{username}/{tab}/delete_media", delete(delete_media))
}

async fn require_tab_dir(config: &Config, username: &str, tab: &str) -> AppResult<std::path::PathBuf> {
    let tab_dir = config.users_dir().join(username).join(tab);
    if tokio::fs::try_exists(&tab_dir).await.unwrap_or(false) {
        Ok(tab_dir)
    } else {
        Err(AppError::NotFound(format!("tab {username}/{tab}")))
    }
}

#[debug_handler(state = AppState)]
async fn profile_summary(
    Path(username): Path<String>,
    State(config): State<Arc<Config>>,
) -> AppResult<Json<serde_json::Value>> {
    let mut tabs = Vec::new();
    for tab in walker::list_tabs(&config, &username).await {
        let tab_path = config.users_dir().join(&username).join(&tab);
        tabs.push(json!({
            "name": tab,
            "type": walker::detect_tab_type(&tab_path).await,
            "count": walker::count_media(&tab_path).await,
        }));
    }
    Ok(Json(json!({ "username": username, "tabs": tabs })))
}

fn check_name(name: &str, what: &str) -> AppResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(AppError::Validation(format!("invalid {what}: {name}")));
    }
    Ok(())
}

#[derive(Deserialize)]
struct AddTabPayload {
    tab_name: String,
    #[serde(default = "default_tab_type")]
    tab_type: String,
    #[serde(default)]
    description: String,
}

fn default_tab_type() -> String {
    "media".to_owned()
}

#[debug_handler(state = AppState)]
async fn add_tab(
    Path(username): Path<String>,
    State(config): State<Arc<Config>>,
    State(stories): State<StoryStore>,
    Json(payload): Json<AddTabPayload>,
) -> AppResult<Json<serde_json::Value>> {
    check_name(&payload.tab_name, "tab name")?;
    let tab_dir = config.users_dir().join(&username).join(&payload.tab_name);
    tokio::fs::create_dir_all(&tab_dir).await?;

    if payload.tab_type == "story" {
        stories
            .create(&username, &payload.tab_name, &payload.tab_name, &payload.description)
            .await?;
    }
    Ok(Json(json!({
        "success": true,
        "tab": payload.tab_name,
        "type": payload.tab_type,
    })))
}

#[derive(Deserialize)]
struct MediaQuery {
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
    rel_path: Option<String>,
}

fn default_limit() -> usize {
    30
}

#[debug_handler(state = AppState)]
async fn tab_media(
    Path((username, tab)): Path<(String, String)>,
    Query(query): Query<MediaQuery>,
    State(config): State<Arc<Config>>,
    State(thumbs): State<Thumbnailer>,
) -> AppResult<Json<Vec<MediaItem>>> {
    require_tab_dir(&config, &username, &tab).await?;
    let items = walker::list_page(
        &config,
        &thumbs,
        &username,
        &tab,
        query.rel_path.as_deref(),
        query.offset,
        query.limit,
    )
    .await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
struct AlbumQuery {
    album: Option<String>,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

#[debug_handler(state = AppState)]
async fn album_media(
    Path((username, tab)): Path<(String, String)>,
    Query(query): Query<AlbumQuery>,
    State(config): State<Arc<Config>>,
    State(thumbs): State<Thumbnailer>,
) -> AppResult<Json<Vec<MediaItem>>> {
    require_tab_dir(&config, &username, &tab).await?;
    let items = walker::list_page(
        &config,
        &thumbs,
        &username,
        &tab,
        query.album.as_deref(),
        query.offset,
        query.limit,
    )
    .await?;
    Ok(Json(items))
}

/// Raw file listing of the tab root, for the upload manager.
#[debug_handler(state = AppState)]
async fn tab_files(
    Path((username, tab)): Path<(String, String)>,
    State(config): State<Arc<Config>>,
) -> AppResult<Json<serde_json::Value>> {
    let tab_dir = require_tab_dir(&config, &username, &tab).await?;

    let mut files = Vec::new();
    let mut rd = tokio::fs::read_dir(&tab_dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if thumbs::is_sidecar(&name) {
            continue;
        }
        let meta = entry.metadata().await?;
        files.push(json!({
            "name": name,
            "type": if meta.is_dir() { "folder" } else { "file" },
            "size": if meta.is_file() { Some(meta.len()) } else { None },
        }));
    }
    Ok(Json(json!({ "files": files })))
}

#[derive(Deserialize)]
struct UploadQuery {
    album_path: Option<String>,
}

#[derive(Deserialize)]
struct FolderPayload {
    folder_name: Option<String>,
}

/// Multipart bodies upload files into the tab (or an album within it);
/// JSON bodies create a new album folder instead.
async fn upload(
    Path((username, tab)): Path<(String, String)>,
    Query(UploadQuery { album_path }): Query<UploadQuery>,
    State(config): State<Arc<Config>>,
    request: Request,
) -> AppResult<Json<serde_json::Value>> {
    let mut target = require_tab_dir(&config, &username, &tab).await?;
    if let Some(album) = album_path.as_deref().filter(|a| !a.is_empty()) {
        walker::check_rel_path(album)?;
        target = target.join(album);
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(AppError::NotFound(format!("album {album}")));
        }
    }

    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let mut saved = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?
        {
            let Some(filename) = field.file_name().map(str::to_owned) else {
                continue;
            };
            // Strip any client-supplied directory parts.
            let Some(filename) = FsPath::new(&filename)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(e.to_string()))?;
            tokio::fs::write(target.join(&filename), &data).await?;
            saved.push(filename);
        }
        if saved.is_empty() {
            return Err(AppError::Validation("no files specified".to_owned()));
        }
        tracing::info!(%username, %tab, count = saved.len(), "files uploaded");
        return Ok(Json(json!({ "success": true, "files": saved })));
    }

    let Json(payload): Json<FolderPayload> = Json::from_request(request, &())
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let folder = payload
        .folder_name
        .filter(|f| !f.is_empty())
        .ok_or_else(|| AppError::Validation("no files or folder specified".to_owned()))?;
    check_name(&folder, "folder name")?;

    let folder_path = target.join(&folder);
    if tokio::fs::try_exists(&folder_path).await.unwrap_or(false) {
        return Err(AppError::Validation("folder already exists".to_owned()));
    }
    tokio::fs::create_dir_all(&folder_path).await?;
    Ok(Json(json!({ "success": true, "folder": folder })))
}

#[derive(Deserialize)]
struct DeleteAlbumPayload {
    album_path: Option<String>,
}

#[debug_handler(state = AppState)]
async fn delete_album(
    Path((username, tab)): Path<(String, String)>,
    State(config): State<Arc<Config>>,
    Json(payload): Json<DeleteAlbumPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let tab_dir = require_tab_dir(&config, &username, &tab).await?;
    let album = payload
        .album_path
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::Validation("album path is required".to_owned()))?;
    walker::check_rel_path(&album)?;

    let full_path = tab_dir.join(&album);
    if !tokio::fs::try_exists(&full_path).await.unwrap_or(false) {
        return Err(AppError::NotFound(format!("album {album}")));
    }
    if !full_path.is_dir() {
        return Err(AppError::Validation("path is not a directory".to_owned()));
    }
    tokio::fs::remove_dir_all(&full_path).await?;
    tracing::info!(%username, %tab, %album, "album deleted");
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
struct DeleteMediaPayload {
    media_path: Option<String>,
}

#[debug_handler(state = AppState)]
async fn delete_media(
    Path((username, tab)): Path<(String, String)>,
    State(config): State<Arc<Config>>,
    Json(payload): Json<DeleteMediaPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let tab_dir = require_tab_dir(&config, &username, &tab).await?;
    let media = payload
        .media_path
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::Validation("media path is required".to_owned()))?;
    walker::check_rel_path(&media)?;

    let full_path = tab_dir.join(&media);
    if !tokio::fs::try_exists(&full_path).await.unwrap_or(false) {
        return Err(AppError::NotFound(format!("media {media}")));
    }
    if full_path.is_dir() {
        return Err(AppError::Validation(
            "path is a directory, not a media file".to_owned(),
        ));
    }
    tokio::fs::remove_file(&full_path).await?;

    // The derived thumbnail goes with its video.
    let sidecar = thumbs::sidecar_path(&full_path);
    if tokio::fs::try_exists(&sidecar).await.unwrap_or(false) {
        tokio::fs::remove_file(&sidecar).await?;
    }
    tracing::info!(%username, %tab, %media, "media deleted");
    Ok(Json(json!({ "success": true })))
}
