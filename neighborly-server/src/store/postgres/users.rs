use async_trait::async_trait;
use neighborly_core::{DisplayName, EmailAddress, UserStatus};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{conflict_on_unique, parse_column, PgStore};
use crate::store::{StoreError, User, UserStore};

const USER_COLUMNS: &str = "id, email, full_name, status, created_at, updated_at";

pub(super) fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(
        &self,
        email: &EmailAddress,
        full_name: &DisplayName,
    ) -> Result<User, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (email, full_name) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(email.as_str())
        .bind(full_name.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "user", "email already registered"))?;

        user_from_row(&row)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = lower(trim($1))"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(user_from_row)
        .transpose()
    }

    async fn set_user_status(&self, id: Uuid, status: UserStatus) -> Result<User, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user", id))?;

        user_from_row(&row)
    }

    async fn update_user_name(
        &self,
        id: Uuid,
        full_name: &DisplayName,
    ) -> Result<User, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE users SET full_name = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(full_name.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("user", id))?;

        user_from_row(&row)
    }

    /// Foreign keys do the cascading: owned rows are `ON DELETE CASCADE`,
    /// authored rows `ON DELETE SET NULL`.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
