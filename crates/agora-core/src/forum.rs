//! # Forum Service
//!
//! Orchestrates the repository ports into the operations a transport layer
//! calls: submitting, listing and deleting posts, commenting, voting and
//! logging in.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::{
    CommentId, CommentView, Identity, NewPost, PostDetail, PostId, PostListItem, SessionToken,
    User, UserId, Vote, VoteTarget,
};
use crate::ranking::{RankingEngine, RankingParams};
use crate::traits::{CommentRepo, IdentityProvider, PostRepo, SessionIssuer, UserRepo, VoteRepo};

/// The collaborators a [`Forum`] is wired from.
#[derive(Clone)]
pub struct Ports {
    pub posts: Arc<dyn PostRepo>,
    pub votes: Arc<dyn VoteRepo>,
    pub comments: Arc<dyn CommentRepo>,
    pub users: Arc<dyn UserRepo>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sessions: Arc<dyn SessionIssuer>,
}

impl Ports {
    /// Wires all four repositories to one store implementation.
    pub fn from_store<S>(
        store: Arc<S>,
        identity: Arc<dyn IdentityProvider>,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self
    where
        S: PostRepo + VoteRepo + CommentRepo + UserRepo + 'static,
    {
        Self {
            posts: store.clone(),
            votes: store.clone(),
            comments: store.clone(),
            users: store,
            identity,
            sessions,
        }
    }
}

/// A post with its comments, as shown on the post page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPage {
    pub detail: PostDetail,
    pub comments: Vec<CommentView>,
}

pub struct Forum {
    ports: Ports,
    ranking: Arc<RankingEngine>,
}

impl Forum {
    pub fn new(ports: Ports, params: RankingParams) -> Self {
        let ranking = Arc::new(RankingEngine::new(ports.posts.clone(), params));
        Self { ports, ranking }
    }

    /// Shares an existing engine instead of building one.
    pub fn with_ranking(ports: Ports, ranking: Arc<RankingEngine>) -> Self {
        Self { ports, ranking }
    }

    /// The engine behind the vote fast path; hand it to a
    /// [`RankScheduler`](crate::scheduler::RankScheduler) for periodic sweeps.
    pub fn ranking(&self) -> Arc<RankingEngine> {
        self.ranking.clone()
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn submit_post(
        &self,
        author: &UserId,
        title: &str,
        url: Option<&str>,
        description: &str,
    ) -> Result<PostId> {
        let post = NewPost::new(title, url, description, author.clone());
        post.validate()?;
        let id = self.ports.posts.insert_post(post).await?;
        info!(post_id = %id, author = %author, "post submitted");
        Ok(id)
    }

    pub async fn post_detail(&self, id: PostId) -> Result<Option<PostDetail>> {
        self.ports.posts.post_detail(id).await
    }

    pub async fn post_page(&self, id: PostId) -> Result<Option<PostPage>> {
        let Some(detail) = self.ports.posts.post_detail(id).await? else {
            return Ok(None);
        };
        let comments = self.ports.comments.comments_for_post(id).await?;
        Ok(Some(PostPage { detail, comments }))
    }

    /// The ranked front page as seen by `viewer`.
    pub async fn list_posts(&self, viewer: &UserId) -> Result<Vec<PostListItem>> {
        self.ports.posts.list_for_viewer(viewer).await
    }

    /// Deletes a post owned by `requester` together with its comments and votes.
    ///
    /// Fails with `NotFound` for an unknown post and `Forbidden` when the
    /// requester is not the author.
    pub async fn delete_post(&self, id: PostId, requester: &UserId) -> Result<()> {
        let author = self
            .ports
            .posts
            .post_author(id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", id))?;
        if &author != requester {
            warn!(post_id = %id, requester = %requester, "refusing to delete someone else's post");
            return Err(AppError::Forbidden(format!("post {id} belongs to another user")));
        }
        self.ports.posts.delete_post_cascade(id).await?;
        info!(post_id = %id, "post deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    pub async fn add_comment(&self, post: PostId, author: &UserId, text: &str) -> Result<CommentId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::ValidationError("comment text must not be empty".into()));
        }
        let id = self.ports.comments.insert_comment(post, author, text).await?;
        debug!(post_id = %post, comment_id = %id, "comment added");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Votes
    // ------------------------------------------------------------------

    /// Records a vote on exactly one of `post` / `comment` and returns it.
    ///
    /// The `has_voted` read is only a shortcut; a concurrent duplicate that
    /// slips past it is rejected by the store. Post votes refresh that
    /// post's rank immediately, and a failure there is logged only since the
    /// next sweep repairs it.
    pub async fn vote(
        &self,
        voter: &UserId,
        post: Option<PostId>,
        comment: Option<CommentId>,
    ) -> Result<Vote> {
        let target = VoteTarget::from_refs(post, comment)?;

        if self.ports.votes.has_voted(voter, target).await? {
            return Err(AppError::DuplicateVote { voter: voter.clone(), target });
        }
        let vote = self.ports.votes.cast_vote(voter, target).await?;
        debug!(voter = %voter, %target, "vote recorded");

        if let Some(post_id) = target.post_id() {
            if let Err(e) = self.ranking.recompute_one(post_id).await {
                warn!(post_id = %post_id, error = %e, "could not refresh rank after vote");
            }
        }
        Ok(vote)
    }

    pub async fn vote_count(&self, post: PostId) -> Result<i64> {
        self.ports.votes.count_for_post(post).await
    }

    /// Moderation: drop every vote on a post and zero its rank.
    pub async fn clear_votes(&self, post: PostId) -> Result<u64> {
        let removed = self.ports.votes.clear_votes_for_post(post).await?;
        info!(post_id = %post, removed, "votes cleared");
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Exchanges an authorization code, creates the user on first login and
    /// issues a session token.
    pub async fn login(&self, code: &str) -> Result<(User, SessionToken)> {
        let identity = self.ports.identity.exchange_code(code).await?;
        let user = self.ports.users.ensure_user(&identity).await?;
        let token = self.ports.sessions.issue(&identity)?;
        info!(user = %user.id, "user logged in");
        Ok((user, token))
    }

    pub fn authenticate(&self, token: &str) -> Result<Identity> {
        self.ports.sessions.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use crate::traits::{
        MockCommentRepo, MockIdentityProvider, MockPostRepo, MockSessionIssuer, MockUserRepo,
        MockVoteRepo,
    };
    use chrono::Utc;
    use mockall::predicate::eq;

    struct Mocks {
        posts: MockPostRepo,
        votes: MockVoteRepo,
        comments: MockCommentRepo,
        users: MockUserRepo,
        identity: MockIdentityProvider,
        sessions: MockSessionIssuer,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                posts: MockPostRepo::new(),
                votes: MockVoteRepo::new(),
                comments: MockCommentRepo::new(),
                users: MockUserRepo::new(),
                identity: MockIdentityProvider::new(),
                sessions: MockSessionIssuer::new(),
            }
        }

        fn forum(self) -> Forum {
            Forum::new(
                Ports {
                    posts: Arc::new(self.posts),
                    votes: Arc::new(self.votes),
                    comments: Arc::new(self.comments),
                    users: Arc::new(self.users),
                    identity: Arc::new(self.identity),
                    sessions: Arc::new(self.sessions),
                },
                RankingParams::default(),
            )
        }
    }

    fn alice() -> UserId {
        UserId::from("alice")
    }

    #[tokio::test]
    async fn blank_title_never_reaches_the_store() {
        let mut m = Mocks::new();
        m.posts.expect_insert_post().never();
        let forum = m.forum();

        let err = forum.submit_post(&alice(), "   ", None, "text").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn submit_normalises_empty_url() {
        let mut m = Mocks::new();
        m.posts
            .expect_insert_post()
            .withf(|p| p.title == "Hello" && p.url.is_none() && p.author_id.0 == "alice")
            .times(1)
            .returning(|_| Ok(PostId(7)));
        let forum = m.forum();

        let id = forum.submit_post(&alice(), " Hello ", Some("  "), "").await.unwrap();
        assert_eq!(id, PostId(7));
    }

    #[tokio::test]
    async fn vote_rejects_ambiguous_targets() {
        let mut m = Mocks::new();
        m.votes.expect_cast_vote().never();
        let forum = m.forum();

        let both = forum.vote(&alice(), Some(PostId(1)), Some(CommentId(1))).await;
        assert!(matches!(both, Err(AppError::ValidationError(_))));
        let neither = forum.vote(&alice(), None, None).await;
        assert!(matches!(neither, Err(AppError::ValidationError(_))));
    }

    #[tokio::test]
    async fn vote_precheck_short_circuits_duplicates() {
        let mut m = Mocks::new();
        m.votes.expect_has_voted().returning(|_, _| Ok(true));
        m.votes.expect_cast_vote().never();
        let forum = m.forum();

        let err = forum.vote(&alice(), Some(PostId(3)), None).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(err, AppError::DuplicateVote { target: VoteTarget::Post(PostId(3)), .. }));
    }

    #[tokio::test]
    async fn store_level_duplicate_is_surfaced() {
        let mut m = Mocks::new();
        m.votes.expect_has_voted().returning(|_, _| Ok(false));
        m.votes.expect_cast_vote().returning(|voter, target| {
            Err(AppError::DuplicateVote { voter: voter.clone(), target })
        });
        m.posts.expect_update_rank().never();
        let forum = m.forum();

        let err = forum.vote(&alice(), Some(PostId(3)), None).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateVote { .. }));
    }

    #[tokio::test]
    async fn post_vote_refreshes_rank_and_tolerates_failure() {
        let mut m = Mocks::new();
        m.votes.expect_has_voted().returning(|_, _| Ok(false));
        m.votes.expect_cast_vote().times(1).returning(|voter, target| {
            Ok(Vote { target, voter_id: voter.clone(), created_at: Utc::now() })
        });
        m.posts
            .expect_ranking_input()
            .with(eq(PostId(5)))
            .times(1)
            .returning(|_| Err(AppError::Store("database is locked".into())));
        let forum = m.forum();

        let vote = forum.vote(&alice(), Some(PostId(5)), None).await.unwrap();
        assert_eq!(vote.target, VoteTarget::Post(PostId(5)));
        assert_eq!(vote.voter_id, alice());
    }

    #[tokio::test]
    async fn comment_vote_skips_ranking() {
        let mut m = Mocks::new();
        m.votes.expect_has_voted().returning(|_, _| Ok(false));
        m.votes.expect_cast_vote().times(1).returning(|voter, target| {
            Ok(Vote { target, voter_id: voter.clone(), created_at: Utc::now() })
        });
        m.posts.expect_ranking_input().never();
        let forum = m.forum();

        forum.vote(&alice(), None, Some(CommentId(2))).await.unwrap();
    }

    #[tokio::test]
    async fn delete_distinguishes_missing_from_foreign() {
        let mut m = Mocks::new();
        m.posts
            .expect_post_author()
            .with(eq(PostId(1)))
            .returning(|_| Ok(None));
        m.posts
            .expect_post_author()
            .with(eq(PostId(2)))
            .returning(|_| Ok(Some(UserId::from("bob"))));
        m.posts.expect_delete_post_cascade().never();
        let forum = m.forum();

        assert!(forum.delete_post(PostId(1), &alice()).await.unwrap_err().is_not_found());
        assert!(matches!(
            forum.delete_post(PostId(2), &alice()).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn author_can_delete() {
        let mut m = Mocks::new();
        m.posts.expect_post_author().returning(|_| Ok(Some(UserId::from("alice"))));
        m.posts
            .expect_delete_post_cascade()
            .with(eq(PostId(4)))
            .times(1)
            .returning(|_| Ok(()));
        let forum = m.forum();

        forum.delete_post(PostId(4), &alice()).await.unwrap();
    }

    #[tokio::test]
    async fn empty_comment_is_rejected() {
        let mut m = Mocks::new();
        m.comments.expect_insert_comment().never();
        let forum = m.forum();

        let err = forum.add_comment(PostId(1), &alice(), " \n ").await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn post_page_is_none_for_missing_post() {
        let mut m = Mocks::new();
        m.posts.expect_post_detail().returning(|_| Ok(None));
        m.comments.expect_comments_for_post().never();
        let forum = m.forum();

        assert!(forum.post_page(PostId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn post_page_joins_comments() {
        let mut m = Mocks::new();
        m.posts.expect_post_detail().returning(|id| {
            Ok(Some(PostDetail {
                post: Post {
                    id,
                    title: "t".into(),
                    url: None,
                    description: String::new(),
                    created_at: Utc::now(),
                    author_id: UserId::from("alice"),
                    rank: 0,
                },
                author_name: "Alice".into(),
                comment_count: 0,
                vote_count: 0,
            }))
        });
        m.comments.expect_comments_for_post().returning(|_| Ok(vec![]));
        let forum = m.forum();

        let page = forum.post_page(PostId(1)).await.unwrap().unwrap();
        assert_eq!(page.detail.author_name, "Alice");
        assert!(page.comments.is_empty());
    }

    #[tokio::test]
    async fn login_creates_user_and_issues_token() {
        let identity = Identity {
            user_id: alice(),
            name: "Alice".into(),
            email: "alice@example.com".into(),
        };
        let expires_at = Utc::now();

        let mut m = Mocks::new();
        let id = identity.clone();
        m.identity
            .expect_exchange_code()
            .withf(|code| code == "code-123")
            .returning(move |_| Ok(id.clone()));
        m.users.expect_ensure_user().times(1).returning(|identity| {
            Ok(User {
                id: identity.user_id.clone(),
                name: identity.name.clone(),
                email: identity.email.clone(),
                created_at: Utc::now(),
            })
        });
        m.sessions.expect_issue().times(1).returning(move |_| {
            Ok(SessionToken { token: "signed".into(), expires_at })
        });
        let forum = m.forum();

        let (user, token) = forum.login("code-123").await.unwrap();
        assert_eq!(user.id, alice());
        assert_eq!(token.token, "signed");
    }

    #[tokio::test]
    async fn failed_exchange_creates_nobody() {
        let mut m = Mocks::new();
        m.identity
            .expect_exchange_code()
            .returning(|_| Err(AppError::Unauthorized("invalid grant".into())));
        m.users.expect_ensure_user().never();
        m.sessions.expect_issue().never();
        let forum = m.forum();

        assert!(matches!(forum.login("bad").await, Err(AppError::Unauthorized(_))));
    }
}
