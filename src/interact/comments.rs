use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub media_key: String,
    pub user: String,
    pub text: String,
    pub parent_id: Option<i64>,
    pub created: NaiveDateTime,
    pub replies: Vec<Comment>,
}

fn check_media_key(media_key: &str) -> AppResult<()> {
    // "undefined" guards against the stringified-js-undefined a client once sent.
    if media_key.is_empty() || media_key == "undefined" {
        return Err(AppError::Validation("media_key is required".to_owned()));
    }
    Ok(())
}

/// Inserts a comment. A reply's parent must exist and belong to the same
/// media key.
pub async fn add_comment(
    pool: &SqlitePool,
    media_key: &str,
    user: &str,
    text: &str,
    parent_id: Option<i64>,
) -> AppResult<()> {
    check_media_key(media_key)?;

    if let Some(parent) = parent_id {
        let parent_key: Option<(String,)> =
            sqlx::query_as("SELECT media_key FROM comments WHERE id = ?")
                .bind(parent)
                .fetch_optional(pool)
                .await?;
        match parent_key {
            Some((key,)) if key == media_key => {}
            Some(_) => {
                return Err(AppError::Validation(
                    "parent comment belongs to different media".to_owned(),
                ));
            }
            None => {
                return Err(AppError::Validation(format!(
                    "parent comment {parent} does not exist"
                )));
            }
        }
    }

    sqlx::query("INSERT INTO comments (media_key, user, text, parent_id) VALUES (?, ?, ?, ?)")
        .bind(media_key)
        .bind(user)
        .bind(text)
        .bind(parent_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// All comments for a media key as a forest, roots and siblings in creation
/// order, replies nested under their parents.
pub async fn comment_forest(pool: &SqlitePool, media_key: &str) -> AppResult<Vec<Comment>> {
    check_media_key(media_key)?;

    let rows: Vec<(i64, String, String, String, Option<i64>, NaiveDateTime)> = sqlx::query_as(
        "SELECT id, media_key, user, text, parent_id, created
         FROM comments WHERE media_key = ? ORDER BY created ASC, id ASC",
    )
    .bind(media_key)
    .fetch_all(pool)
    .await?;

    let mut by_parent: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for (id, media_key, user, text, parent_id, created) in rows {
        by_parent.entry(parent_id).or_default().push(Comment {
            id,
            media_key,
            user,
            text,
            parent_id,
            created,
            replies: Vec::new(),
        });
    }
    Ok(attach_replies(&mut by_parent, None))
}

fn attach_replies(
    by_parent: &mut HashMap<Option<i64>, Vec<Comment>>,
    parent: Option<i64>,
) -> Vec<Comment> {
    let mut comments = by_parent.remove(&parent).unwrap_or_default();
    for comment in &mut comments {
        comment.replies = attach_replies(by_parent, Some(comment.id));
    }
    comments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn forest_groups_replies_under_roots() {
        let pool = test_pool().await;
        add_comment(&pool, "k", "alice", "root one", None).await.unwrap();
        add_comment(&pool, "k", "bob", "reply to one", Some(1)).await.unwrap();
        add_comment(&pool, "k", "carol", "root two", None).await.unwrap();

        let forest = comment_forest(&pool, "k").await.unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].text, "root one");
        assert_eq!(forest[0].replies.len(), 1);
        assert_eq!(forest[0].replies[0].text, "reply to one");
        assert!(forest[1].replies.is_empty());
    }

    #[tokio::test]
    async fn missing_media_key_is_rejected() {
        let pool = test_pool().await;
        for key in ["", "undefined"] {
            let err = add_comment(&pool, key, "alice", "hi", None).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn reply_must_share_media_key() {
        let pool = test_pool().await;
        add_comment(&pool, "a", "alice", "on a", None).await.unwrap();

        let err = add_comment(&pool, "b", "bob", "cross reply", Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = add_comment(&pool, "a", "bob", "orphan reply", Some(99))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn keys_do_not_leak_between_media() {
        let pool = test_pool().await;
        add_comment(&pool, "a", "alice", "on a", None).await.unwrap();
        add_comment(&pool, "b", "bob", "on b", None).await.unwrap();

        let forest = comment_forest(&pool, "a").await.unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].user, "alice");
    }
}
