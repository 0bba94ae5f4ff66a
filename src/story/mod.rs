pub mod store;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{AppError, AppResult, AppState};
use store::{ConnectionAction, StoryStore};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stories", get(all_stories))
        .route(
            "/api/profile/{username}/{tab}/story",
            get(get_story).post(save_story),
        )
        .route(
            "/api/profile/{username}/{tab}/story/node",
            post(upsert_node).delete(delete_node),
        )
        .route(
            "/api/profile/{username}/{tab}/story/connection",
            post(set_connection),
        )
}

#[debug_handler(state = AppState)]
async fn get_story(
    Path((username, tab)): Path<(String, String)>,
    State(stories): State<StoryStore>,
) -> AppResult<Json<store::StoryDocument>> {
    Ok(Json(stories.load(&username, &tab).await?))
}

#[debug_handler(state = AppState)]
async fn save_story(
    Path((username, tab)): Path<(String, String)>,
    State(stories): State<StoryStore>,
    Json(patch): Json<serde_json::Map<String, serde_json::Value>>,
) -> AppResult<Json<serde_json::Value>> {
    let doc = stories.merge_save(&username, &tab, patch).await?;
    Ok(Json(json!({ "success": true, "story": doc })))
}

#[derive(Deserialize)]
struct NodePayload {
    id: Option<String>,
    #[serde(default)]
    content: String,
}

#[debug_handler(state = AppState)]
async fn upsert_node(
    Path((username, tab)): Path<(String, String)>,
    State(stories): State<StoryStore>,
    Json(payload): Json<NodePayload>,
) -> AppResult<Json<serde_json::Value>> {
    let id = payload
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("node id required".to_owned()))?;
    let nodes = stories
        .upsert_node(&username, &tab, &id, &payload.content)
        .await?;
    Ok(Json(json!({ "success": true, "nodes": nodes })))
}

#[debug_handler(state = AppState)]
async fn delete_node(
    Path((username, tab)): Path<(String, String)>,
    State(stories): State<StoryStore>,
    Json(payload): Json<NodePayload>,
) -> AppResult<Json<serde_json::Value>> {
    let id = payload
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::Validation("node id required".to_owned()))?;
    let (nodes, connections) = stories.delete_node(&username, &tab, &id).await?;
    Ok(Json(
        json!({ "success": true, "nodes": nodes, "connections": connections }),
    ))
}

#[derive(Deserialize)]
struct ConnectionPayload {
    from: Option<String>,
    to: Option<String>,
    #[serde(default)]
    action: ConnectionAction,
}

#[debug_handler(state = AppState)]
async fn set_connection(
    Path((username, tab)): Path<(String, String)>,
    State(stories): State<StoryStore>,
    Json(payload): Json<ConnectionPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let (Some(from), Some(to)) = (payload.from, payload.to) else {
        return Err(AppError::Validation("from and to required".to_owned()));
    };
    let connections = stories
        .set_connection(&username, &tab, &from, &to, payload.action)
        .await?;
    Ok(Json(json!({ "success": true, "connections": connections })))
}

/// Every story across all users, each tagged with its owner, tab, and the
/// owner's avatar seed for attribution.
#[debug_handler(state = AppState)]
async fn all_stories(
    State(stories): State<StoryStore>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<serde_json::Value>>> {
    let mut out = Vec::new();
    for (user, tab, doc) in stories.all_stories().await {
        let avatar_seed: Option<(Option<String>,)> =
            sqlx::query_as("SELECT avatar_seed FROM users WHERE username = ?")
                .bind(&user)
                .fetch_optional(&db_pool)
                .await?;

        let mut entry = match serde_json::to_value(&doc)? {
            serde_json::Value::Object(obj) => obj,
            _ => continue,
        };
        entry.insert("user".to_owned(), json!(user));
        entry.insert("tab".to_owned(), json!(tab));
        entry.insert(
            "avatar_seed".to_owned(),
            json!(avatar_seed.and_then(|(seed,)| seed)),
        );
        out.push(serde_json::Value::Object(entry));
    }
    Ok(Json(out))
}
