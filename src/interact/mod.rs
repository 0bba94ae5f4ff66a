pub mod comments;
pub mod likes;

use axum::{
    Json, Router, debug_handler,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::session::{GUEST_USER, USERNAME};
use crate::{AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/comments", get(get_comments).post(post_comment))
        .route("/api/likes", get(get_likes).post(post_like))
}

async fn session_user(session: &Session) -> AppResult<String> {
    Ok(session
        .get::<String>(USERNAME)
        .await?
        .unwrap_or_else(|| GUEST_USER.to_owned()))
}

#[derive(Deserialize)]
struct MediaKeyQuery {
    #[serde(default)]
    media_key: String,
}

#[debug_handler(state = AppState)]
async fn get_comments(
    Query(MediaKeyQuery { media_key }): Query<MediaKeyQuery>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<comments::Comment>>> {
    Ok(Json(comments::comment_forest(&db_pool, &media_key).await?))
}

#[derive(Deserialize)]
struct CommentPayload {
    #[serde(default)]
    media_key: String,
    #[serde(default)]
    text: String,
    parent_id: Option<i64>,
}

#[debug_handler(state = AppState)]
async fn post_comment(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<CommentPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let user = session_user(&session).await?;
    comments::add_comment(
        &db_pool,
        &payload.media_key,
        &user,
        &payload.text,
        payload.parent_id,
    )
    .await?;
    Ok(Json(json!({ "success": true })))
}

#[debug_handler(state = AppState)]
async fn get_likes(
    Query(MediaKeyQuery { media_key }): Query<MediaKeyQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<likes::VoteSummary>> {
    let user = session_user(&session).await?;
    Ok(Json(likes::vote_summary(&db_pool, &media_key, &user).await?))
}

#[derive(Deserialize)]
struct LikePayload {
    #[serde(default)]
    media_key: String,
    value: i64,
}

#[debug_handler(state = AppState)]
async fn post_like(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<LikePayload>,
) -> AppResult<Json<serde_json::Value>> {
    let user = session_user(&session).await?;
    likes::cast_vote(&db_pool, &payload.media_key, &user, payload.value).await?;
    Ok(Json(json!({ "success": true })))
}
