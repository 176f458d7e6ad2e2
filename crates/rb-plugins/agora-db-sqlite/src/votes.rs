use agora_core::error::{AppError, Result};
use agora_core::models::{PostId, UserId, Vote, VoteTarget};
use agora_core::traits::VoteRepo;
use async_trait::async_trait;
use sqlx::error::ErrorKind;
use tracing::debug;

use crate::{now_text, parse_ts, store_err, violation, SqliteStore};

#[async_trait]
impl VoteRepo for SqliteStore {
    /// The partial unique indexes are the real guard: a racing second insert
    /// for the same voter and target fails here even if both callers passed
    /// a `has_voted` check.
    async fn cast_vote(&self, voter: &UserId, target: VoteTarget) -> Result<Vote> {
        let created_at = now_text();
        sqlx::query("INSERT INTO votes (post_id, comment_id, user_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(target.post_id().map(|p| p.0))
            .bind(target.comment_id().map(|c| c.0))
            .bind(&voter.0)
            .bind(&created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match violation(&e) {
                Some(ErrorKind::UniqueViolation) => AppError::DuplicateVote {
                    voter: voter.clone(),
                    target,
                },
                Some(ErrorKind::ForeignKeyViolation) => match target {
                    VoteTarget::Post(p) => AppError::not_found("Post", p),
                    VoteTarget::Comment(c) => AppError::not_found("Comment", c),
                },
                Some(ErrorKind::CheckViolation) => {
                    AppError::ValidationError("a vote needs exactly one target".into())
                }
                _ => store_err("cast vote", target, e),
            })?;

        Ok(Vote {
            target,
            voter_id: voter.clone(),
            created_at: parse_ts(&created_at)?,
        })
    }

    async fn has_voted(&self, voter: &UserId, target: VoteTarget) -> Result<bool> {
        // `IS` so that the NULL side of the target compares equal.
        sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM votes
                 WHERE post_id IS ? AND comment_id IS ? AND user_id = ?
             )",
        )
        .bind(target.post_id().map(|p| p.0))
        .bind(target.comment_id().map(|c| c.0))
        .bind(&voter.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_err("has voted", target, e))
    }

    async fn count_for_post(&self, post: PostId) -> Result<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id)
             FROM posts p WHERE p.id = ?",
        )
        .bind(post.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("count votes", post, e))?;

        count.ok_or_else(|| AppError::not_found("Post", post))
    }

    async fn clear_votes_for_post(&self, post: PostId) -> Result<u64> {
        let err = |e: sqlx::Error| store_err("clear votes", post, e);
        let mut tx = self.pool.begin().await.map_err(err)?;

        let reset = sqlx::query("UPDATE posts SET rank = 0 WHERE id = ?")
            .bind(post.0)
            .execute(&mut *tx)
            .await
            .map_err(err)?
            .rows_affected();
        if reset == 0 {
            return Err(AppError::not_found("Post", post));
        }

        let removed = sqlx::query("DELETE FROM votes WHERE post_id = ?")
            .bind(post.0)
            .execute(&mut *tx)
            .await
            .map_err(err)?
            .rows_affected();

        tx.commit().await.map_err(err)?;
        debug!(post_id = %post, removed, "votes cleared");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::store_with_users;
    use agora_core::models::{CommentId, NewPost};
    use agora_core::traits::{CommentRepo, PostRepo};

    async fn seeded() -> (SqliteStore, PostId) {
        let store = store_with_users(&["alice", "bob", "carol"]).await;
        let post = store
            .insert_post(NewPost::new("votable", None, "", UserId::from("alice")))
            .await
            .unwrap();
        (store, post)
    }

    #[tokio::test]
    async fn second_vote_is_rejected_and_not_counted() {
        let (store, post) = seeded().await;
        let bob = UserId::from("bob");

        let vote = store.cast_vote(&bob, VoteTarget::Post(post)).await.unwrap();
        assert_eq!(vote.target, VoteTarget::Post(post));
        assert_eq!(vote.voter_id, bob);
        let err = store.cast_vote(&bob, VoteTarget::Post(post)).await.unwrap_err();

        assert!(matches!(err, AppError::DuplicateVote { .. }));
        assert!(err.is_conflict());
        assert_eq!(store.count_for_post(post).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicates_admit_exactly_one() {
        let (store, post) = seeded().await;
        let carol = UserId::from("carol");

        let (a, b) = tokio::join!(
            store.cast_vote(&carol, VoteTarget::Post(post)),
            store.cast_vote(&carol, VoteTarget::Post(post)),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.count_for_post(post).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn post_and_comment_votes_are_separate() {
        let (store, post) = seeded().await;
        let bob = UserId::from("bob");
        let comment = store.insert_comment(post, &bob, "hello").await.unwrap();

        store.cast_vote(&bob, VoteTarget::Post(post)).await.unwrap();
        store.cast_vote(&bob, VoteTarget::Comment(comment)).await.unwrap();

        assert!(store.has_voted(&bob, VoteTarget::Post(post)).await.unwrap());
        assert!(store.has_voted(&bob, VoteTarget::Comment(comment)).await.unwrap());
        assert!(!store.has_voted(&UserId::from("carol"), VoteTarget::Post(post)).await.unwrap());
        // Comment votes do not count toward the post.
        assert_eq!(store.count_for_post(post).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn voting_on_missing_targets_is_not_found() {
        let (store, _) = seeded().await;
        let bob = UserId::from("bob");

        let err = store.cast_vote(&bob, VoteTarget::Post(PostId(404))).await.unwrap_err();
        assert!(err.is_not_found());
        let err = store
            .cast_vote(&bob, VoteTarget::Comment(CommentId(404)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn count_for_missing_post_is_not_found() {
        let (store, post) = seeded().await;
        assert_eq!(store.count_for_post(post).await.unwrap(), 0);
        assert!(store.count_for_post(PostId(404)).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn clearing_votes_resets_rank() {
        let (store, post) = seeded().await;
        store.cast_vote(&UserId::from("bob"), VoteTarget::Post(post)).await.unwrap();
        store.cast_vote(&UserId::from("carol"), VoteTarget::Post(post)).await.unwrap();
        store.update_rank(post, 100).await.unwrap();

        assert_eq!(store.clear_votes_for_post(post).await.unwrap(), 2);
        assert_eq!(store.count_for_post(post).await.unwrap(), 0);
        assert_eq!(store.post_detail(post).await.unwrap().unwrap().post.rank, 0);

        // The same voter may vote again afterwards.
        store.cast_vote(&UserId::from("bob"), VoteTarget::Post(post)).await.unwrap();
        assert!(store.clear_votes_for_post(PostId(404)).await.unwrap_err().is_not_found());
    }
}
