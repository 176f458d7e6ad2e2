//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    CommentId, CommentView, Identity, NewPost, PostDetail, PostId, PostListItem, RankingInput,
    SessionToken, User, UserId, Vote, VoteTarget,
};

/// Data persistence contract for posts and the projections built on them.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Fails with `ValidationError` on an empty title, `Conflict` on a duplicate url.
    async fn insert_post(&self, post: NewPost) -> Result<PostId>;

    async fn post_detail(&self, id: PostId) -> Result<Option<PostDetail>>;

    /// All posts, ordered by rank descending then newest first. A post whose
    /// creation time cannot be read is left out.
    async fn list_for_viewer(&self, viewer: &UserId) -> Result<Vec<PostListItem>>;

    async fn post_author(&self, id: PostId) -> Result<Option<UserId>>;

    /// Removes the post together with its comments and every vote on either.
    async fn delete_post_cascade(&self, id: PostId) -> Result<()>;

    // Ranking
    async fn ranking_inputs(&self) -> Result<Vec<RankingInput>>;
    async fn ranking_input(&self, id: PostId) -> Result<Option<RankingInput>>;
    async fn update_rank(&self, id: PostId, rank: i64) -> Result<()>;
}

/// One vote per voter per target.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VoteRepo: Send + Sync {
    /// Records the vote and returns it. Fails with `DuplicateVote` when the
    /// voter already voted on `target`, including when a concurrent insert
    /// wins the race.
    async fn cast_vote(&self, voter: &UserId, target: VoteTarget) -> Result<Vote>;

    async fn has_voted(&self, voter: &UserId, target: VoteTarget) -> Result<bool>;

    /// Fails with `NotFound` when the post no longer exists.
    async fn count_for_post(&self, post: PostId) -> Result<i64>;

    /// Drops every vote on the post and resets its rank to 0.
    async fn clear_votes_for_post(&self, post: PostId) -> Result<u64>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn insert_comment(&self, post: PostId, author: &UserId, text: &str) -> Result<CommentId>;

    /// Oldest first.
    async fn comments_for_post(&self, post: PostId) -> Result<Vec<CommentView>>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Inserts the user on first sight; an existing row is returned untouched.
    async fn ensure_user(&self, identity: &Identity) -> Result<User>;

    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;
}

/// External identity provider (OAuth/OIDC code exchange).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<Identity>;
}

/// Issues and checks the session tokens handed to browsers after login.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SessionIssuer: Send + Sync {
    fn issue(&self, identity: &Identity) -> Result<SessionToken>;

    /// Fails with `Unauthorized` for expired, forged or foreign tokens.
    fn verify(&self, token: &str) -> Result<Identity>;
}
