use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::PgStore;
use crate::store::{SessionRecord, SessionStore, StoreError, MAX_LOGIN_ATTEMPTS};

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(
        &self,
        token_hash: &str,
        email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, email, expires_at)
            VALUES ($1, $2, $3)
            RETURNING token_hash, email, created_at, expires_at
            "#,
        )
        .bind(token_hash)
        .bind(email)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(SessionRecord {
            token_hash: row.try_get("token_hash")?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT token_hash, email, created_at, expires_at FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(SessionRecord {
            token_hash: row.try_get("token_hash")?,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        }))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn put_login_code(
        &self,
        email: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO login_codes (email, code_hash, expires_at, attempts)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (email) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                expires_at = EXCLUDED.expires_at,
                attempts = 0,
                created_at = NOW()
            "#,
        )
        .bind(email)
        .bind(code_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_login_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT code_hash, expires_at, attempts FROM login_codes WHERE email = $1 FOR UPDATE",
        )
        .bind(email)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let stored: String = row.try_get("code_hash")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        let attempts: i32 = row.try_get("attempts")?;

        let accepted = expires_at > now && stored == code_hash;
        if accepted || expires_at <= now || attempts + 1 >= MAX_LOGIN_ATTEMPTS {
            sqlx::query("DELETE FROM login_codes WHERE email = $1")
                .bind(email)
                .execute(&mut *tx)
                .await?;
        } else {
            sqlx::query("UPDATE login_codes SET attempts = attempts + 1 WHERE email = $1")
                .bind(email)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(accepted)
    }
}
