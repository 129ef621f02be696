use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neighborly_core::{poll, VoteSelection};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{missing_on_foreign_key, PgStore};
use crate::store::{
    NewPoll, Poll, PollOption, PollOptionTally, PollStore, PollSummary, StoreError,
};

const POLL_COLUMNS: &str =
    "p.id, p.community_id, p.author_id, p.question, p.allow_multiple, p.closes_at, p.created_at";

fn poll_from_row(row: &PgRow) -> Result<Poll, StoreError> {
    Ok(Poll {
        id: row.try_get("id")?,
        community_id: row.try_get("community_id")?,
        author_id: row.try_get("author_id")?,
        question: row.try_get("question")?,
        allow_multiple: row.try_get("allow_multiple")?,
        closes_at: row.try_get("closes_at")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PgStore {
    /// Tallies and the viewer's ballot for a batch of polls, two queries total.
    async fn summarize(
        &self,
        polls: Vec<Poll>,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollSummary>, StoreError> {
        if polls.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = polls.iter().map(|p| p.id).collect();

        let option_rows = sqlx::query(
            r#"
            SELECT o.id, o.poll_id, o.label, o.position,
                   COUNT(v.user_id) AS votes,
                   BOOL_OR(v.user_id = $2) AS mine
            FROM poll_options o
            LEFT JOIN poll_votes v ON v.option_id = o.id
            WHERE o.poll_id = ANY($1)
            GROUP BY o.id, o.poll_id, o.label, o.position
            ORDER BY o.poll_id, o.position
            "#,
        )
        .bind(&ids)
        .bind(viewer_id)
        .fetch_all(&self.pool)
        .await?;

        let voter_rows = sqlx::query(
            r#"
            SELECT poll_id, COUNT(DISTINCT user_id) AS voters
            FROM poll_votes
            WHERE poll_id = ANY($1)
            GROUP BY poll_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut voters: HashMap<Uuid, i64> = HashMap::new();
        for row in &voter_rows {
            voters.insert(row.try_get("poll_id")?, row.try_get("voters")?);
        }

        let mut options: HashMap<Uuid, Vec<PollOptionTally>> = HashMap::new();
        let mut mine: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in &option_rows {
            let poll_id: Uuid = row.try_get("poll_id")?;
            let tally = PollOptionTally {
                id: row.try_get("id")?,
                label: row.try_get("label")?,
                position: row.try_get("position")?,
                votes: row.try_get("votes")?,
            };
            if row.try_get::<Option<bool>, _>("mine")?.unwrap_or(false) {
                mine.entry(poll_id).or_default().push(tally.id);
            }
            options.entry(poll_id).or_default().push(tally);
        }

        Ok(polls
            .into_iter()
            .map(|p| PollSummary {
                options: options.remove(&p.id).unwrap_or_default(),
                voters: voters.get(&p.id).copied().unwrap_or(0),
                my_votes: mine.remove(&p.id).unwrap_or_default(),
                is_open: poll::is_open(p.closes_at, now),
                poll: p,
            })
            .collect())
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn create_poll(&self, new: NewPoll) -> Result<(Poll, Vec<PollOption>), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO polls AS p (community_id, author_id, question, allow_multiple, closes_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {POLL_COLUMNS}
            "#
        ))
        .bind(new.community_id)
        .bind(new.author_id)
        .bind(new.draft.question.as_str())
        .bind(new.draft.allow_multiple)
        .bind(new.draft.closes_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| missing_on_foreign_key(e, "community", new.community_id))?;
        let poll = poll_from_row(&row)?;

        let mut options = Vec::with_capacity(new.draft.options.len());
        for (position, label) in new.draft.options.iter().enumerate() {
            let row = sqlx::query(
                r#"
                INSERT INTO poll_options (poll_id, label, position)
                VALUES ($1, $2, $3)
                RETURNING id, poll_id, label, position
                "#,
            )
            .bind(poll.id)
            .bind(label)
            .bind(position as i32)
            .fetch_one(&mut *tx)
            .await?;

            options.push(PollOption {
                id: row.try_get("id")?,
                poll_id: row.try_get("poll_id")?,
                label: row.try_get("label")?,
                position: row.try_get("position")?,
            });
        }

        tx.commit().await?;
        Ok((poll, options))
    }

    async fn find_poll(&self, id: Uuid) -> Result<Option<Poll>, StoreError> {
        sqlx::query(&format!("SELECT {POLL_COLUMNS} FROM polls p WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(poll_from_row)
            .transpose()
    }

    async fn poll_options(&self, poll_id: Uuid) -> Result<Vec<PollOption>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, poll_id, label, position FROM poll_options WHERE poll_id = $1 ORDER BY position",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(PollOption {
                    id: r.try_get("id")?,
                    poll_id: r.try_get("poll_id")?,
                    label: r.try_get("label")?,
                    position: r.try_get("position")?,
                })
            })
            .collect()
    }

    async fn poll_summary(
        &self,
        poll_id: Uuid,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<PollSummary>, StoreError> {
        let Some(poll) = self.find_poll(poll_id).await? else {
            return Ok(None);
        };
        Ok(self.summarize(vec![poll], viewer_id, now).await?.pop())
    }

    async fn list_polls(
        &self,
        community_id: Uuid,
        viewer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<PollSummary>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {POLL_COLUMNS} FROM polls p
            WHERE p.community_id = $1
            ORDER BY p.created_at DESC
            "#
        ))
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        let polls = rows
            .iter()
            .map(poll_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        self.summarize(polls, viewer_id, now).await
    }

    async fn replace_votes(
        &self,
        poll_id: Uuid,
        user_id: Uuid,
        selection: &VoteSelection,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Last write wins: drop the previous ballot entirely
        sqlx::query("DELETE FROM poll_votes WHERE poll_id = $1 AND user_id = $2")
            .bind(poll_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        for option_id in selection.option_ids() {
            let result = sqlx::query(
                "INSERT INTO poll_votes (poll_id, option_id, user_id) VALUES ($1, $2, $3)",
            )
            .bind(poll_id)
            .bind(option_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| missing_on_foreign_key(e, "poll", poll_id))?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn count_user_votes(&self, poll_id: Uuid, user_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM poll_votes WHERE poll_id = $1 AND user_id = $2",
        )
        .bind(poll_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("count")?)
    }

    async fn delete_poll(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
