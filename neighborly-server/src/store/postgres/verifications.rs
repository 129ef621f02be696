use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neighborly_core::VerificationStatus;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{missing_on_foreign_key, parse_column, PgStore};
use crate::store::{
    NewVerification, StoreError, Verification, VerificationStore, VerificationWithUser,
};

const VERIFICATION_COLUMNS: &str = "v.id, v.user_id, v.document_type, v.document_key, \
    v.content_type, v.status, v.submitted_at, v.reviewed_at, v.reviewed_by, v.approved_at, \
    v.rejection_reason";

fn verification_from_row(row: &PgRow) -> Result<Verification, StoreError> {
    Ok(Verification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        document_type: row.try_get("document_type")?,
        document_key: row.try_get("document_key")?,
        content_type: row.try_get("content_type")?,
        status: parse_column(row, "status")?,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        approved_at: row.try_get("approved_at")?,
        rejection_reason: row.try_get("rejection_reason")?,
    })
}

#[async_trait]
impl VerificationStore for PgStore {
    async fn create_verification(&self, new: NewVerification) -> Result<Verification, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO id_verifications AS v (user_id, document_type, document_key, content_type)
            VALUES ($1, $2, $3, $4)
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(new.user_id)
        .bind(&new.document_type)
        .bind(&new.document_key)
        .bind(&new.content_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_on_foreign_key(e, "user", new.user_id))?;

        verification_from_row(&row)
    }

    async fn find_verification(&self, id: Uuid) -> Result<Option<Verification>, StoreError> {
        sqlx::query(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM id_verifications v WHERE v.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(verification_from_row)
        .transpose()
    }

    async fn latest_verification_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Verification>, StoreError> {
        sqlx::query(&format!(
            r#"
            SELECT {VERIFICATION_COLUMNS} FROM id_verifications v
            WHERE v.user_id = $1
            ORDER BY v.submitted_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(verification_from_row)
        .transpose()
    }

    async fn list_verifications_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Verification>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {VERIFICATION_COLUMNS} FROM id_verifications v
            WHERE v.user_id = $1
            ORDER BY v.submitted_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(verification_from_row).collect()
    }

    async fn list_verifications_for_community(
        &self,
        community_id: Uuid,
        status: Option<VerificationStatus>,
    ) -> Result<Vec<VerificationWithUser>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {VERIFICATION_COLUMNS}, u.email, u.full_name
            FROM id_verifications v
            JOIN users u ON u.id = v.user_id
            JOIN community_members m ON m.user_id = v.user_id
            WHERE m.community_id = $1
              AND ($2::text IS NULL OR v.status = $2)
            ORDER BY v.submitted_at DESC
            "#
        ))
        .bind(community_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(VerificationWithUser {
                    verification: verification_from_row(r)?,
                    email: r.try_get("email")?,
                    full_name: r.try_get("full_name")?,
                })
            })
            .collect()
    }

    async fn review_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        reviewer_id: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Verification, StoreError> {
        // Guarded on status so two reviewers cannot both win
        let row = sqlx::query(&format!(
            r#"
            UPDATE id_verifications AS v
            SET status = $2,
                reviewed_at = $4,
                reviewed_by = $3,
                rejection_reason = $5,
                approved_at = CASE WHEN $2 = 'approved' THEN $4 ELSE NULL END
            WHERE v.id = $1 AND v.status = 'pending'
            RETURNING {VERIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(reviewer_id)
        .bind(now)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => verification_from_row(&row),
            None => match self.find_verification(id).await? {
                Some(_) => Err(StoreError::conflict("verification", "already reviewed")),
                None => Err(StoreError::not_found("verification", id)),
            },
        }
    }
}
