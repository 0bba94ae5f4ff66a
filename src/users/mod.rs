pub mod account;

use std::sync::Arc;

use axum::{
    Form, Json, Router, debug_handler,
    extract::State,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::session::{USER_ID, USERNAME};
use crate::{AppError, AppResult, AppState, Config};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/api/avatar/get", get(get_avatar))
        .route("/api/avatar/update", post(update_avatar))
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
    email: Option<String>,
}

#[debug_handler(state = AppState)]
async fn signup(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    Form(Credentials {
        username,
        password,
        email,
    }): Form<Credentials>,
) -> AppResult<Json<serde_json::Value>> {
    account::create_account(
        &db_pool,
        &config.users_dir(),
        &username,
        &password,
        email.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "success": true, "username": username })))
}

#[debug_handler(state = AppState)]
async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(Credentials {
        username, password, ..
    }): Form<Credentials>,
) -> AppResult<Json<serde_json::Value>> {
    let user = account::authenticate(&db_pool, &username, &password).await?;
    session.insert(USER_ID, user.id).await?;
    session.insert(USERNAME, &user.username).await?;
    tracing::info!(username = %user.username, "logged in");
    Ok(Json(json!({ "success": true, "username": user.username })))
}

#[debug_handler]
async fn logout(session: Session) -> AppResult<Json<serde_json::Value>> {
    session.clear().await;
    Ok(Json(json!({ "success": true })))
}

async fn session_user_id(session: &Session) -> AppResult<i64> {
    session
        .get::<i64>(USER_ID)
        .await?
        .ok_or_else(|| AppError::Unauthorized("not logged in".to_owned()))
}

#[debug_handler(state = AppState)]
async fn get_avatar(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = session_user_id(&session).await?;
    let seed = account::avatar_seed(&db_pool, user_id).await?;
    Ok(Json(json!({ "avatar_seed": seed })))
}

#[derive(Deserialize)]
struct AvatarPayload {
    avatar_seed: Option<String>,
}

#[debug_handler(state = AppState)]
async fn update_avatar(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(payload): Json<AvatarPayload>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = session_user_id(&session).await?;
    let seed = payload
        .avatar_seed
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("avatar seed required".to_owned()))?;
    account::set_avatar_seed(&db_pool, user_id, &seed).await?;
    Ok(Json(json!({ "success": true })))
}
