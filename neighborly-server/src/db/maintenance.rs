//! One-shot operator statements behind `neighborly admin ...`

use neighborly_core::{JoinCode, Role, UserStatus};
use sqlx::PgPool;

use crate::store::StoreError;

/// Set `approved_at` on approved verifications that predate the column.
pub async fn backfill_approved_at(pool: &PgPool) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE id_verifications
        SET approved_at = COALESCE(reviewed_at, submitted_at)
        WHERE status = 'approved' AND approved_at IS NULL
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(rows = result.rows_affected(), "backfilled approved_at");
    Ok(result.rows_affected())
}

/// Make a user Admin of the community with the given join code, adding the
/// membership when missing.
pub async fn promote_admin(pool: &PgPool, email: &str, code: &JoinCode) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO community_members (community_id, user_id, role)
        SELECT c.id, u.id, $3
        FROM users u, communities c
        WHERE u.email = lower(trim($1)) AND upper(c.code) = upper($2)
        ON CONFLICT (community_id, user_id) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(email)
    .bind(code.as_str())
    .bind(Role::Admin.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(
            "user or community",
            format!("{email} / {code}", code = code.as_str()),
        ));
    }

    tracing::info!(email, code = code.as_str(), "promoted to Admin");
    Ok(())
}

/// Force a user's verification status.
pub async fn set_user_status(
    pool: &PgPool,
    email: &str,
    status: UserStatus,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE users SET status = $2, updated_at = NOW() WHERE email = lower(trim($1))",
    )
    .bind(email)
    .bind(status.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("user", email));
    }

    tracing::info!(email, status = status.as_str(), "user status set");
    Ok(())
}
