//! Demo data for local development.
//!
//! Logs three demo accounts in through the forum, submits a few posts with
//! comments and votes, runs one ranking sweep and prints a session token
//! per account. Running it again leaves existing demo posts alone.

use std::collections::HashSet;
use std::sync::Arc;

use agora_auth_jwt::JwtSessions;
use agora_core::{AppError, Forum, Identity, IdentityProvider, Ports, Result, UserId};
use agora_db_sqlite::SqliteStore;
use anyhow::Context;
use async_trait::async_trait;
use configs::Settings;
use tracing::{info, warn};

const DEMO_USERS: [(&str, &str); 3] = [("ada", "Ada"), ("grace", "Grace"), ("linus", "Linus")];

const DEMO_POSTS: [(&str, &str, Option<&str>, &str); 3] = [
    (
        "ada",
        "The Rust Programming Language",
        Some("https://doc.rust-lang.org/book/"),
        "The book, free online.",
    ),
    (
        "grace",
        "Ask: favourite SQLite pragmas?",
        None,
        "WAL and foreign keys are a given. What else?",
    ),
    (
        "linus",
        "Tokio tutorial",
        Some("https://tokio.rs/tokio/tutorial"),
        "",
    ),
];

/// Accepts a demo user's id as the authorization code.
struct DemoIdentities;

#[async_trait]
impl IdentityProvider for DemoIdentities {
    async fn exchange_code(&self, code: &str) -> Result<Identity> {
        DEMO_USERS
            .iter()
            .find(|(id, _)| *id == code)
            .map(|(id, name)| Identity {
                user_id: UserId::from(*id),
                name: (*name).to_string(),
                email: format!("{id}@agora.local"),
            })
            .ok_or_else(|| AppError::Unauthorized(format!("no demo user {code:?}")))
    }
}

pub async fn run(store: Arc<SqliteStore>, settings: &Settings) -> anyhow::Result<()> {
    let sessions = JwtSessions::new(&settings.auth.jwt_secret, &settings.auth.issuer)
        .with_ttl(chrono::Duration::seconds(settings.auth.token_ttl_secs));
    let ports = Ports::from_store(store, Arc::new(DemoIdentities), Arc::new(sessions));
    let forum = Forum::new(ports, settings.ranking.params());

    let mut tokens = Vec::new();
    for (id, _) in DEMO_USERS {
        let (user, token) = forum.login(id).await.context("logging in demo user")?;
        tokens.push((user.id, token));
    }

    // Posts without a url have no unique key in the store, so match on
    // author and title instead.
    let existing: HashSet<(UserId, String)> = forum
        .list_posts(&UserId::from(DEMO_USERS[0].0))
        .await
        .context("listing existing posts")?
        .into_iter()
        .map(|item| (item.post.author_id, item.post.title))
        .collect();

    for (author, title, url, description) in DEMO_POSTS {
        let author = UserId::from(author);
        if existing.contains(&(author.clone(), title.to_string())) {
            warn!(title, "demo post already present, skipping");
            continue;
        }
        let post = match forum.submit_post(&author, title, url, description).await {
            Ok(post) => post,
            Err(e) if e.is_conflict() => {
                warn!(title, "demo post already present, skipping");
                continue;
            }
            Err(e) => return Err(e).context("submitting demo post"),
        };

        forum
            .add_comment(post, &author, "First!")
            .await
            .context("commenting on demo post")?;
        for (voter, _) in DEMO_USERS.iter().filter(|(id, _)| *id != author.0) {
            forum
                .vote(&UserId::from(*voter), Some(post), None)
                .await
                .context("voting on demo post")?;
        }
    }

    let report = forum.ranking().recompute_all().await.context("ranking demo posts")?;
    info!(scored = report.scored, "demo data ready");

    for (user, token) in tokens {
        println!("{user}\t{}\t(expires {})", token.token, token.expires_at);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::traits::PostRepo;

    #[tokio::test]
    async fn seeding_twice_keeps_one_copy_of_each_post() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let settings = Settings::from_toml("[auth]\njwt_secret = \"s3cret\"").unwrap();

        run(store.clone(), &settings).await.unwrap();
        run(store.clone(), &settings).await.unwrap();

        let posts = store.list_for_viewer(&UserId::from("ada")).await.unwrap();
        assert_eq!(posts.len(), DEMO_POSTS.len());
        for item in posts {
            assert_eq!(item.comment_count, 1, "{}", item.post.title);
            assert_eq!(item.vote_count, 2, "{}", item.post.title);
        }
    }
}
