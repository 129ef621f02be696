use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neighborly_core::{Paginated, Pagination};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{missing_on_foreign_key, PgStore};
use crate::store::{
    Conversation, ConversationSummary, Message, MessageStore, NewMessage, StoreError,
};

fn message_from_row(row: &PgRow) -> Result<Message, StoreError> {
    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender_id: row.try_get("sender_id")?,
        body: row.try_get("body")?,
        gif_url: row.try_get("gif_url")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl MessageStore for PgStore {
    async fn create_conversation(
        &self,
        community_id: Uuid,
        created_by: Uuid,
        participants: &[Uuid],
    ) -> Result<Conversation, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO conversations (community_id, created_by)
            VALUES ($1, $2)
            RETURNING id, community_id, created_by, created_at
            "#,
        )
        .bind(community_id)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| missing_on_foreign_key(e, "community", community_id))?;

        let conversation = Conversation {
            id: row.try_get("id")?,
            community_id: row.try_get("community_id")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        };

        let mut seen = HashSet::new();
        let everyone = std::iter::once(created_by).chain(participants.iter().copied());
        for user_id in everyone.filter(|id| seen.insert(*id)) {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2)",
            )
            .bind(conversation.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| missing_on_foreign_key(e, "user", user_id))?;
        }

        tx.commit().await?;
        Ok(conversation)
    }

    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            "SELECT id, community_id, created_by, created_at FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Conversation {
            id: row.try_get("id")?,
            community_id: row.try_get("community_id")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn conversation_participants(&self, id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = $1 ORDER BY joined_at",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get("user_id").map_err(StoreError::from))
            .collect()
    }

    async fn list_conversations(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<ConversationSummary>, StoreError> {
        // One query: participants aggregated, last message via LATERAL,
        // unread counted against message_reads
        let rows = sqlx::query(
            r#"
            SELECT
                c.id, c.community_id, c.created_at,
                (SELECT ARRAY_AGG(p.user_id ORDER BY p.joined_at)
                   FROM conversation_participants p
                  WHERE p.conversation_id = c.id) AS participants,
                lm.id AS last_id, lm.sender_id AS last_sender_id, lm.body AS last_body,
                lm.gif_url AS last_gif_url, lm.created_at AS last_created_at,
                (SELECT COUNT(*) FROM messages m
                  WHERE m.conversation_id = c.id
                    AND m.sender_id IS DISTINCT FROM $1
                    AND NOT EXISTS (
                        SELECT 1 FROM message_reads r
                         WHERE r.message_id = m.id AND r.user_id = $1
                    )) AS unread_count
            FROM conversations c
            JOIN conversation_participants me
              ON me.conversation_id = c.id AND me.user_id = $1
            LEFT JOIN LATERAL (
                SELECT id, sender_id, body, gif_url, created_at
                FROM messages
                WHERE conversation_id = c.id
                ORDER BY created_at DESC
                LIMIT 1
            ) lm ON TRUE
            ORDER BY COALESCE(lm.created_at, c.created_at) DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let id: Uuid = r.try_get("id")?;
                let last_id: Option<Uuid> = r.try_get("last_id")?;
                let last_message = match last_id {
                    Some(message_id) => Some(Message {
                        id: message_id,
                        conversation_id: id,
                        sender_id: r.try_get("last_sender_id")?,
                        body: r.try_get("last_body")?,
                        gif_url: r.try_get("last_gif_url")?,
                        created_at: r.try_get("last_created_at")?,
                    }),
                    None => None,
                };
                Ok(ConversationSummary {
                    id,
                    community_id: r.try_get("community_id")?,
                    participants: r
                        .try_get::<Option<Vec<Uuid>>, _>("participants")?
                        .unwrap_or_default(),
                    last_message,
                    unread_count: r.try_get("unread_count")?,
                    created_at: r.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn add_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, sender_id, body, gif_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, sender_id, body, gif_url, created_at
            "#,
        )
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(new.body.as_deref())
        .bind(new.gif_url.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| missing_on_foreign_key(e, "conversation", new.conversation_id))?;

        message_from_row(&row)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: Pagination,
    ) -> Result<Paginated<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, sender_id, body, gif_url, created_at,
                   COUNT(*) OVER() AS total
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(conversation_id)
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
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            SELECT m.id, $2, $3
            FROM messages m
            WHERE m.conversation_id = $1
              AND m.sender_id IS DISTINCT FROM $2
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
