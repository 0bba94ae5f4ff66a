use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteSummary {
    pub likes: i64,
    pub dislikes: i64,
    /// This user's current vote: +1, -1, or 0 when they have not voted.
    pub user_value: i64,
}

/// Upserts the user's vote on a media key; a new vote replaces any prior one.
pub async fn cast_vote(
    pool: &SqlitePool,
    media_key: &str,
    user: &str,
    value: i64,
) -> AppResult<()> {
    if media_key.is_empty() || media_key == "undefined" {
        return Err(AppError::Validation("media_key is required".to_owned()));
    }
    if value != 1 && value != -1 {
        return Err(AppError::Validation("vote value must be 1 or -1".to_owned()));
    }

    sqlx::query("INSERT OR REPLACE INTO likes (media_key, user, value) VALUES (?, ?, ?)")
        .bind(media_key)
        .bind(user)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn vote_summary(
    pool: &SqlitePool,
    media_key: &str,
    user: &str,
) -> AppResult<VoteSummary> {
    let (likes, dislikes): (i64, i64) = sqlx::query_as(
        "SELECT
            COALESCE(SUM(CASE WHEN value = 1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN value = -1 THEN 1 ELSE 0 END), 0)
         FROM likes WHERE media_key = ?",
    )
    .bind(media_key)
    .fetch_one(pool)
    .await?;

    let user_value: Option<(i64,)> =
        sqlx::query_as("SELECT value FROM likes WHERE media_key = ? AND user = ?")
            .bind(media_key)
            .bind(user)
            .fetch_optional(pool)
            .await?;

    Ok(VoteSummary {
        likes,
        dislikes,
        user_value: user_value.map(|(v,)| v).unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn new_vote_replaces_old_vote() {
        let pool = test_pool().await;
        cast_vote(&pool, "k", "alice", 1).await.unwrap();
        cast_vote(&pool, "k", "alice", -1).await.unwrap();

        let summary = vote_summary(&pool, "k", "alice").await.unwrap();
        assert_eq!(
            summary,
            VoteSummary {
                likes: 0,
                dislikes: 1,
                user_value: -1
            }
        );
    }

    #[tokio::test]
    async fn summary_counts_per_user_votes() {
        let pool = test_pool().await;
        cast_vote(&pool, "k", "alice", 1).await.unwrap();
        cast_vote(&pool, "k", "bob", 1).await.unwrap();
        cast_vote(&pool, "k", "carol", -1).await.unwrap();
        cast_vote(&pool, "other", "dave", 1).await.unwrap();

        let summary = vote_summary(&pool, "k", "dave").await.unwrap();
        assert_eq!(
            summary,
            VoteSummary {
                likes: 2,
                dislikes: 1,
                user_value: 0
            }
        );
    }

    #[tokio::test]
    async fn invalid_votes_are_rejected() {
        let pool = test_pool().await;
        assert!(matches!(
            cast_vote(&pool, "k", "alice", 2).await.unwrap_err(),
            AppError::Validation(_)
        ));
        assert!(matches!(
            cast_vote(&pool, "", "alice", 1).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }
}
