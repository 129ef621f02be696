use async_trait::async_trait;
use neighborly_core::{Paginated, Pagination};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{missing_on_foreign_key, PgStore};
use crate::store::{Announcement, AnnouncementStore, NewAnnouncement, StoreError};

fn announcement_from_row(row: &PgRow) -> Result<Announcement, StoreError> {
    Ok(Announcement {
        id: row.try_get("id")?,
        community_id: row.try_get("community_id")?,
        author_id: row.try_get("author_id")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        pinned: row.try_get("pinned")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AnnouncementStore for PgStore {
    async fn create_announcement(
        &self,
        new: NewAnnouncement,
    ) -> Result<Announcement, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO announcements (community_id, author_id, title, body, pinned)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, community_id, author_id, title, body, pinned, created_at
            "#,
        )
        .bind(new.community_id)
        .bind(new.author_id)
        .bind(&new.title)
        .bind(&new.body)
        .bind(new.pinned)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_on_foreign_key(e, "community", new.community_id))?;

        announcement_from_row(&row)
    }

    async fn list_announcements(
        &self,
        community_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Announcement>, StoreError> {
        // Single query with COUNT(*) OVER() for total
        let rows = sqlx::query(
            r#"
            SELECT id, community_id, author_id, title, body, pinned, created_at,
                   COUNT(*) OVER() AS total
            FROM announcements
            WHERE community_id = $1
            ORDER BY pinned DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(community_id)
        .bind(i64::from(page.limit()))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total = match rows.first() {
            Some(r) => r.try_get::<i64, _>("total")?,
            None => 0,
        };
        let items = rows
            .iter()
            .map(announcement_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn find_announcement(&self, id: Uuid) -> Result<Option<Announcement>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, community_id, author_id, title, body, pinned, created_at
            FROM announcements WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(announcement_from_row)
        .transpose()
    }

    async fn delete_announcement(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM announcements WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
