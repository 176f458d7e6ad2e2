//! # Domain Models
//!
//! These structs represent the core entities of Agora and the read
//! projections handed to whatever view layer sits on top of the core.
//! Posts and comments are keyed by store-assigned integers; users by the
//! opaque subject issued by the identity provider.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Store-assigned identifier of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

/// Store-assigned identifier of a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub i64);

/// Subject identifier issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A known user. Created on first login and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Display name as reported by the identity provider at first login.
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A submitted link or text post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    /// Unique across posts when present.
    pub url: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub author_id: UserId,
    /// Cached hotness score; only the ranking engine writes it.
    pub rank: i64,
}

/// Payload for [`crate::traits::PostRepo::insert_post`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub url: Option<String>,
    pub description: String,
    pub author_id: UserId,
}

impl NewPost {
    /// Builds a submission, trimming input and treating an empty url as absent.
    pub fn new(title: &str, url: Option<&str>, description: &str, author_id: UserId) -> Self {
        Self {
            title: title.trim().to_string(),
            url: url.map(str::trim).filter(|u| !u.is_empty()).map(str::to_string),
            description: description.trim().to_string(),
            author_id,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("post title must not be empty".into()));
        }
        Ok(())
    }
}

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub post_id: PostId,
    pub author_id: UserId,
}

/// The single post or comment a vote applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteTarget {
    Post(PostId),
    Comment(CommentId),
}

impl VoteTarget {
    /// Resolves the pair of optional references a form submits into exactly
    /// one target. Both or neither set is a validation failure.
    pub fn from_refs(post: Option<PostId>, comment: Option<CommentId>) -> Result<Self> {
        match (post, comment) {
            (Some(p), None) => Ok(Self::Post(p)),
            (None, Some(c)) => Ok(Self::Comment(c)),
            (Some(_), Some(_)) => Err(AppError::ValidationError(
                "a vote targets either a post or a comment, not both".into(),
            )),
            (None, None) => Err(AppError::ValidationError(
                "a vote needs a post or a comment target".into(),
            )),
        }
    }

    pub fn post_id(&self) -> Option<PostId> {
        match self {
            Self::Post(p) => Some(*p),
            Self::Comment(_) => None,
        }
    }

    pub fn comment_id(&self) -> Option<CommentId> {
        match self {
            Self::Post(_) => None,
            Self::Comment(c) => Some(*c),
        }
    }
}

impl fmt::Display for VoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post(p) => write!(f, "post {p}"),
            Self::Comment(c) => write!(f, "comment {c}"),
        }
    }
}

/// An append-only vote fact. Votes have no identifier of their own; the
/// `(target, voter)` pair is the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub target: VoteTarget,
    pub voter_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Single post joined with its aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: Post,
    pub author_name: String,
    pub comment_count: i64,
    pub vote_count: i64,
}

/// Row of the ranked post list, personalised for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostListItem {
    pub post: Post,
    pub author_name: String,
    pub comment_count: i64,
    pub vote_count: i64,
    pub viewer_voted: bool,
}

/// Comment joined with its author and vote count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub comment: Comment,
    pub author_name: String,
    pub vote_count: i64,
}

/// What the ranking engine reads per post. `created_at` is the raw stored
/// text so that a malformed value fails for this post alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingInput {
    pub post_id: PostId,
    pub vote_count: i64,
    pub created_at: String,
}

/// Identity asserted by the identity provider or carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
}

/// A signed session token and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
