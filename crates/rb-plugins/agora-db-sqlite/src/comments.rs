use agora_core::error::{AppError, Result};
use agora_core::models::{Comment, CommentId, CommentView, PostId, UserId};
use agora_core::traits::CommentRepo;
use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::{now_text, parse_ts, store_err, violation, SqliteStore};

fn row_to_view(row: &SqliteRow) -> std::result::Result<CommentView, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;
    let created_at = parse_ts(&created_at).map_err(|e| sqlx::Error::ColumnDecode {
        index: "created_at".into(),
        source: Box::new(e),
    })?;
    Ok(CommentView {
        comment: Comment {
            id: CommentId(row.try_get("id")?),
            text: row.try_get("text")?,
            created_at,
            post_id: PostId(row.try_get("post_id")?),
            author_id: UserId(row.try_get("author_id")?),
        },
        author_name: row.try_get("author_name")?,
        vote_count: row.try_get("vote_count")?,
    })
}

#[async_trait]
impl CommentRepo for SqliteStore {
    async fn insert_comment(&self, post: PostId, author: &UserId, text: &str) -> Result<CommentId> {
        let result = sqlx::query(
            "INSERT INTO comments (text, created_at, post_id, author_id) VALUES (?, ?, ?, ?)",
        )
        .bind(text)
        .bind(now_text())
        .bind(post.0)
        .bind(&author.0)
        .execute(&self.pool)
        .await
        .map_err(|e| match violation(&e) {
            // Either the post or the author is gone; the post is the likely one.
            Some(ErrorKind::ForeignKeyViolation) => AppError::not_found("Post", post),
            Some(ErrorKind::CheckViolation) => {
                AppError::ValidationError("comment text must not be empty".into())
            }
            _ => store_err("insert comment", post, e),
        })?;

        Ok(CommentId(result.last_insert_rowid()))
    }

    async fn comments_for_post(&self, post: PostId) -> Result<Vec<CommentView>> {
        let rows = sqlx::query(
            "SELECT c.id, c.text, c.created_at, c.post_id, c.author_id,
                 COALESCE(u.name, '') AS author_name,
                 (SELECT COUNT(*) FROM votes v WHERE v.comment_id = c.id) AS vote_count
             FROM comments c LEFT JOIN users u ON u.id = c.author_id
             WHERE c.post_id = ?
             ORDER BY c.created_at ASC, c.id ASC",
        )
        .bind(post.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("list comments", post, e))?;

        rows.iter()
            .map(row_to_view)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| store_err("decode comments", post, e))
    }
}
