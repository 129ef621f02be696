use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::{parse_column, PgStore};
use crate::store::{NewNotification, Notification, NotificationStore, StoreError};

#[async_trait]
impl NotificationStore for PgStore {
    async fn create_notifications(&self, items: Vec<NewNotification>) -> Result<u64, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for item in &items {
            let result = sqlx::query(
                r#"
                INSERT INTO notifications (user_id, kind, title, body, link)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.user_id)
            .bind(item.kind.as_str())
            .bind(&item.title)
            .bind(&item.body)
            .bind(item.link.as_deref())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: u32,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, title, body, link, read_at, created_at
            FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(Notification {
                    id: r.try_get("id")?,
                    user_id: r.try_get("user_id")?,
                    kind: parse_column(r, "kind")?,
                    title: r.try_get("title")?,
                    body: r.try_get("body")?,
                    link: r.try_get("link")?,
                    read_at: r.try_get("read_at")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET read_at = COALESCE(read_at, $3)
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = $2 WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
