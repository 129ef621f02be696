use async_trait::async_trait;
use neighborly_core::{Paginated, Pagination};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{missing_on_foreign_key, PgStore};
use crate::store::{Feedback, FeedbackStore, NewFeedback, StoreError};

fn feedback_from_row(row: &PgRow) -> Result<Feedback, StoreError> {
    Ok(Feedback {
        id: row.try_get("id")?,
        community_id: row.try_get("community_id")?,
        user_id: row.try_get("user_id")?,
        category: row.try_get("category")?,
        message: row.try_get("message")?,
        rating: row.try_get("rating")?,
        sentiment: row.try_get("sentiment")?,
        sentiment_score: row.try_get("sentiment_score")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl FeedbackStore for PgStore {
    async fn create_feedback(&self, new: NewFeedback) -> Result<Feedback, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO feedback
                (community_id, user_id, category, message, rating, sentiment, sentiment_score)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, community_id, user_id, category, message, rating,
                      sentiment, sentiment_score, created_at
            "#,
        )
        .bind(new.community_id)
        .bind(new.user_id)
        .bind(&new.category)
        .bind(&new.message)
        .bind(new.rating)
        .bind(&new.sentiment)
        .bind(new.sentiment_score)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_on_foreign_key(e, "community", new.community_id))?;

        feedback_from_row(&row)
    }

    async fn list_feedback(
        &self,
        community_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Feedback>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, community_id, user_id, category, message, rating,
                   sentiment, sentiment_score, created_at,
                   COUNT(*) OVER() AS total
            FROM feedback
            WHERE community_id = $1
            ORDER BY created_at DESC
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
            .map(feedback_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }
}
