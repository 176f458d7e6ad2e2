//! [`PostRepo`] for [`SqliteStore`]: post CRUD, the list and detail
//! projections, and the ranking read/write path.

use agora_core::error::{AppError, Result};
use agora_core::models::{NewPost, Post, PostDetail, PostId, PostListItem, RankingInput, UserId};
use agora_core::traits::PostRepo;
use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, warn};

use crate::{now_text, parse_ts, store_err, violation, SqliteStore};

const POST_COLUMNS: &str = "p.id, p.title, p.url, p.description, p.created_at, p.author_id, p.rank,
     COALESCE(u.name, '') AS author_name,
     (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count,
     (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id) AS vote_count";

fn row_to_post(row: &SqliteRow) -> std::result::Result<Post, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;
    let created_at = parse_ts(&created_at).map_err(|e| sqlx::Error::ColumnDecode {
        index: "created_at".into(),
        source: Box::new(e),
    })?;
    Ok(Post {
        id: PostId(row.try_get("id")?),
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        description: row.try_get("description")?,
        created_at,
        author_id: UserId(row.try_get("author_id")?),
        rank: row.try_get("rank")?,
    })
}

fn row_to_detail(row: &SqliteRow) -> std::result::Result<PostDetail, sqlx::Error> {
    Ok(PostDetail {
        post: row_to_post(row)?,
        author_name: row.try_get("author_name")?,
        comment_count: row.try_get("comment_count")?,
        vote_count: row.try_get("vote_count")?,
    })
}

fn row_to_list_item(row: &SqliteRow) -> std::result::Result<PostListItem, sqlx::Error> {
    Ok(PostListItem {
        post: row_to_post(row)?,
        author_name: row.try_get("author_name")?,
        comment_count: row.try_get("comment_count")?,
        vote_count: row.try_get("vote_count")?,
        viewer_voted: row.try_get("viewer_voted")?,
    })
}

fn row_to_ranking_input(row: &SqliteRow) -> std::result::Result<RankingInput, sqlx::Error> {
    Ok(RankingInput {
        post_id: PostId(row.try_get("id")?),
        vote_count: row.try_get("vote_count")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl PostRepo for SqliteStore {
    async fn insert_post(&self, post: NewPost) -> Result<PostId> {
        post.validate()?;

        let result = sqlx::query(
            "INSERT INTO posts (title, url, description, created_at, author_id, rank)
             VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(now_text())
        .bind(&post.author_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| match violation(&e) {
            Some(ErrorKind::UniqueViolation) => AppError::Conflict(format!(
                "url {} was already submitted",
                post.url.as_deref().unwrap_or_default()
            )),
            Some(ErrorKind::ForeignKeyViolation) => AppError::not_found("User", &post.author_id),
            Some(ErrorKind::CheckViolation) => {
                AppError::ValidationError("post title must not be empty".into())
            }
            _ => store_err("insert post", &post.title, e),
        })?;

        Ok(PostId(result.last_insert_rowid()))
    }

    async fn post_detail(&self, id: PostId) -> Result<Option<PostDetail>> {
        let sql = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p LEFT JOIN users u ON u.id = p.author_id
             WHERE p.id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_err("post detail", id, e))?;

        row.as_ref()
            .map(row_to_detail)
            .transpose()
            .map_err(|e| store_err("decode post detail", id, e))
    }

    async fn list_for_viewer(&self, viewer: &UserId) -> Result<Vec<PostListItem>> {
        // Newest first among equal ranks, so fresh rank-0 posts surface ahead
        // of older ones.
        let sql = format!(
            "SELECT {POST_COLUMNS},
                 EXISTS (SELECT 1 FROM votes v WHERE v.post_id = p.id AND v.user_id = ?)
                     AS viewer_voted
             FROM posts p LEFT JOIN users u ON u.id = p.author_id
             ORDER BY p.rank DESC, p.created_at DESC, p.id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(&viewer.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_err("list posts", viewer, e))?;

        // A row with an unreadable creation time is dropped from the page
        // rather than failing it; the sweep scores such posts 0.
        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_list_item(row) {
                Ok(item) => items.push(item),
                Err(sqlx::Error::ColumnDecode { ref index, ref source }) if index == "created_at" => {
                    let post_id: i64 = row.try_get("id").unwrap_or_default();
                    warn!(post_id, error = %source, "skipping post with unparsable creation time");
                }
                Err(e) => return Err(store_err("decode post list", viewer, e)),
            }
        }
        Ok(items)
    }

    async fn post_author(&self, id: PostId) -> Result<Option<UserId>> {
        let author: Option<String> = sqlx::query_scalar("SELECT author_id FROM posts WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_err("post author", id, e))?;
        Ok(author.map(UserId))
    }

    /// Votes on the post's comments, the comments, the post's votes, then the
    /// post itself, all in one transaction.
    async fn delete_post_cascade(&self, id: PostId) -> Result<()> {
        let err = |e: sqlx::Error| store_err("delete post", id, e);
        let mut tx = self.pool.begin().await.map_err(err)?;

        sqlx::query(
            "DELETE FROM votes
             WHERE comment_id IN (SELECT id FROM comments WHERE post_id = ?)",
        )
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        let comments = sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(err)?
            .rows_affected();

        let votes = sqlx::query("DELETE FROM votes WHERE post_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(err)?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(err)?
            .rows_affected();

        if deleted == 0 {
            // Dropping `tx` rolls back.
            return Err(AppError::not_found("Post", id));
        }
        tx.commit().await.map_err(err)?;

        debug!(post_id = %id, comments, votes, "post removed with dependents");
        Ok(())
    }

    async fn ranking_inputs(&self) -> Result<Vec<RankingInput>> {
        let rows = sqlx::query(
            "SELECT p.id, p.created_at,
                 (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id) AS vote_count
             FROM posts p",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_err("ranking inputs", "all", e))?;

        rows.iter()
            .map(row_to_ranking_input)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| store_err("decode ranking inputs", "all", e))
    }

    async fn ranking_input(&self, id: PostId) -> Result<Option<RankingInput>> {
        let row = sqlx::query(
            "SELECT p.id, p.created_at,
                 (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id) AS vote_count
             FROM posts p WHERE p.id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("ranking input", id, e))?;

        row.as_ref()
            .map(row_to_ranking_input)
            .transpose()
            .map_err(|e| store_err("decode ranking input", id, e))
    }

    async fn update_rank(&self, id: PostId, rank: i64) -> Result<()> {
        let affected = sqlx::query("UPDATE posts SET rank = ? WHERE id = ?")
            .bind(rank)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| store_err("update rank", id, e))?
            .rows_affected();
        if affected == 0 {
            debug!(post_id = %id, "post vanished before its rank was written");
        }
        Ok(())
    }
}
