use agora_core::error::{AppError, Result};
use agora_core::models::{Identity, User, UserId};
use agora_core::traits::UserRepo;
use async_trait::async_trait;
use sqlx::error::ErrorKind;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::info;

use crate::{now_text, parse_ts, store_err, violation, SqliteStore};

fn row_to_user(row: &SqliteRow) -> std::result::Result<User, sqlx::Error> {
    let created_at: String = row.try_get("created_at")?;
    let created_at = parse_ts(&created_at).map_err(|e| sqlx::Error::ColumnDecode {
        index: "created_at".into(),
        source: Box::new(e),
    })?;
    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        created_at,
    })
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn ensure_user(&self, identity: &Identity) -> Result<User> {
        let inserted = sqlx::query(
            "INSERT INTO users (id, name, email, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&identity.user_id.0)
        .bind(&identity.name)
        .bind(&identity.email)
        .bind(now_text())
        .execute(&self.pool)
        .await
        .map_err(|e| match violation(&e) {
            Some(ErrorKind::UniqueViolation) => AppError::Conflict(format!(
                "email {} belongs to another user",
                identity.email
            )),
            _ => store_err("ensure user", &identity.user_id, e),
        })?
        .rows_affected();

        if inserted > 0 {
            info!(user_id = %identity.user_id, "registered new user");
        }

        self.get_user(&identity.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", &identity.user_id))
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, created_at FROM users WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_err("get user", id, e))?;

        row.as_ref()
            .map(row_to_user)
            .transpose()
            .map_err(|e| store_err("decode user", id, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::store_with_users;

    fn identity(id: &str, name: &str, email: &str) -> Identity {
        Identity {
            user_id: UserId::from(id),
            name: name.into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn first_login_creates_and_later_logins_keep_the_row() {
        let store = store_with_users(&[]).await;

        let first = store
            .ensure_user(&identity("sub-1", "Ada", "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(first.name, "Ada");

        // Profile changes at the provider are not synced.
        let again = store
            .ensure_user(&identity("sub-1", "Ada Lovelace", "ada@example.com"))
            .await
            .unwrap();
        assert_eq!(again, first);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn email_taken_by_another_subject_conflicts() {
        let store = store_with_users(&["alice"]).await;
        let err = store
            .ensure_user(&identity("impostor", "Eve", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.get_user(&UserId::from("impostor")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let store = store_with_users(&[]).await;
        assert!(store.get_user(&UserId::from("ghost")).await.unwrap().is_none());
    }
}
