//! Shared fixtures for the cross-crate tests: a forum wired to an in-memory
//! SQLite store and real HS256 sessions, with a canned identity provider.

use std::sync::Arc;

use agora_auth_jwt::JwtSessions;
use agora_core::{
    AppError, Forum, Identity, IdentityProvider, Ports, PostId, RankingEngine, RankingParams,
    Result, SessionToken, User, UserId,
};
use agora_db_sqlite::SqliteStore;
use async_trait::async_trait;
use secrecy::SecretString;

pub const TEST_SECRET: &str = "integration-secret";
pub const TEST_ISSUER: &str = "agora-test";

/// Treats the authorization code as the user id and derives name and email
/// from it. The code `"denied"` fails like a rejected provider login.
pub struct CannedIdentities;

#[async_trait]
impl IdentityProvider for CannedIdentities {
    async fn exchange_code(&self, code: &str) -> Result<Identity> {
        if code == "denied" {
            return Err(AppError::Unauthorized("provider refused the code".into()));
        }
        Ok(Identity {
            user_id: UserId::from(code),
            name: format!("User {code}"),
            email: format!("{code}@example.com"),
        })
    }
}

pub fn sessions() -> JwtSessions {
    JwtSessions::new(&SecretString::from(TEST_SECRET.to_string()), TEST_ISSUER)
}

pub struct TestForum {
    pub forum: Forum,
    pub store: Arc<SqliteStore>,
    pub ranking: Arc<RankingEngine>,
}

impl TestForum {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteStore::in_memory().await.expect("in-memory store"));
        let ranking = Arc::new(RankingEngine::new(store.clone(), RankingParams::default()));
        let ports = Ports::from_store(store.clone(), Arc::new(CannedIdentities), Arc::new(sessions()));
        Self {
            forum: Forum::with_ranking(ports, ranking.clone()),
            store,
            ranking,
        }
    }

    /// Logs `id` in through the forum, creating the account on first use.
    pub async fn login(&self, id: &str) -> (User, SessionToken) {
        self.forum.login(id).await.expect("login")
    }

    /// Overwrites a post's stored creation time, bypassing the repository.
    pub async fn backdate(&self, post: PostId, created_at: &str) {
        sqlx::query("UPDATE posts SET created_at = ? WHERE id = ?")
            .bind(created_at)
            .bind(post.0)
            .execute(self.store.pool())
            .await
            .expect("backdate post");
    }

    pub async fn stored_rank(&self, post: PostId) -> i64 {
        sqlx::query_scalar("SELECT rank FROM posts WHERE id = ?")
            .bind(post.0)
            .fetch_one(self.store.pool())
            .await
            .expect("read rank")
    }
}
