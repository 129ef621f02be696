use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neighborly_core::ComplaintStatus;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{missing_on_foreign_key, parse_column, PgStore};
use crate::store::{Complaint, ComplaintFilter, ComplaintStore, NewComplaint, StoreError};

const COMPLAINT_COLUMNS: &str =
    "id, community_id, author_id, title, description, category, status, created_at, updated_at";

fn complaint_from_row(row: &PgRow) -> Result<Complaint, StoreError> {
    Ok(Complaint {
        id: row.try_get("id")?,
        community_id: row.try_get("community_id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ComplaintStore for PgStore {
    async fn create_complaint(&self, new: NewComplaint) -> Result<Complaint, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO complaints (community_id, author_id, title, description, category)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(new.community_id)
        .bind(new.author_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.category)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_on_foreign_key(e, "community", new.community_id))?;

        complaint_from_row(&row)
    }

    async fn list_complaints(
        &self,
        community_id: Uuid,
        filter: ComplaintFilter,
    ) -> Result<Vec<Complaint>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COMPLAINT_COLUMNS}
            FROM complaints
            WHERE community_id = $1
              AND ($2::uuid IS NULL OR author_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC
            "#
        ))
        .bind(community_id)
        .bind(filter.author_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(complaint_from_row).collect()
    }

    async fn find_complaint(&self, id: Uuid) -> Result<Option<Complaint>, StoreError> {
        sqlx::query(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(complaint_from_row)
        .transpose()
    }

    async fn update_complaint_status(
        &self,
        id: Uuid,
        status: ComplaintStatus,
        now: DateTime<Utc>,
    ) -> Result<Complaint, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE complaints SET status = $2, updated_at = $3
            WHERE id = $1
            RETURNING {COMPLAINT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("complaint", id))?;

        complaint_from_row(&row)
    }
}
