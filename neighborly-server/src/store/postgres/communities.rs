use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neighborly_core::{JoinCode, Role, Title};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{conflict_on_unique, missing_on_foreign_key, parse_column, PgStore};
use crate::store::{
    Community, CommunityStats, CommunityStore, CommunityWithRole, MemberProfile, Membership,
    StoreError,
};

fn community_from_row(row: &PgRow) -> Result<Community, StoreError> {
    Ok(Community {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        code: row.try_get("code")?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn membership_from_row(row: &PgRow) -> Result<Membership, StoreError> {
    Ok(Membership {
        community_id: row.try_get("community_id")?,
        user_id: row.try_get("user_id")?,
        role: parse_column(row, "role")?,
        joined_at: row.try_get("joined_at")?,
    })
}

#[async_trait]
impl CommunityStore for PgStore {
    async fn create_community(
        &self,
        name: &Title,
        code: &JoinCode,
        description: Option<&str>,
        creator_id: Uuid,
    ) -> Result<Community, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO communities (name, code, description, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, code, description, created_by, created_at
            "#,
        )
        .bind(name.as_str())
        .bind(code.as_str())
        .bind(description)
        .bind(creator_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::not_found("user", creator_id)
            }
            _ => conflict_on_unique(e, "community", "join code already in use"),
        })?;
        let community = community_from_row(&row)?;

        sqlx::query(
            "INSERT INTO community_members (community_id, user_id, role) VALUES ($1, $2, $3)",
        )
        .bind(community.id)
        .bind(creator_id)
        .bind(Role::Admin.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(community)
    }

    async fn find_community(&self, id: Uuid) -> Result<Option<Community>, StoreError> {
        sqlx::query(
            "SELECT id, name, code, description, created_by, created_at FROM communities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(community_from_row)
        .transpose()
    }

    async fn find_community_by_code(
        &self,
        code: &JoinCode,
    ) -> Result<Option<Community>, StoreError> {
        sqlx::query(
            r#"
            SELECT id, name, code, description, created_by, created_at
            FROM communities
            WHERE upper(code) = upper($1)
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(community_from_row)
        .transpose()
    }

    async fn list_communities_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CommunityWithRole>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.code, c.description, c.created_by, c.created_at, m.role
            FROM community_members m
            JOIN communities c ON c.id = m.community_id
            WHERE m.user_id = $1
            ORDER BY c.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(CommunityWithRole {
                    community: community_from_row(r)?,
                    role: parse_column(r, "role")?,
                })
            })
            .collect()
    }

    async fn add_member(
        &self,
        community_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO community_members (community_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING community_id, user_id, role, joined_at
            "#,
        )
        .bind(community_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::conflict("membership", "already a member")
            }
            _ => missing_on_foreign_key(e, "community", community_id),
        })?;

        membership_from_row(&row)
    }

    async fn find_membership(
        &self,
        community_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, StoreError> {
        sqlx::query(
            r#"
            SELECT community_id, user_id, role, joined_at
            FROM community_members
            WHERE community_id = $1 AND user_id = $2
            "#,
        )
        .bind(community_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(membership_from_row)
        .transpose()
    }

    async fn list_members(&self, community_id: Uuid) -> Result<Vec<MemberProfile>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.email, u.full_name, u.status, m.role, m.joined_at
            FROM community_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.community_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(community_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(MemberProfile {
                    user_id: r.try_get("id")?,
                    email: r.try_get("email")?,
                    full_name: r.try_get("full_name")?,
                    status: parse_column(r, "status")?,
                    role: parse_column(r, "role")?,
                    joined_at: r.try_get("joined_at")?,
                })
            })
            .collect()
    }

    async fn set_member_role(
        &self,
        community_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE community_members SET role = $3
            WHERE community_id = $1 AND user_id = $2
            RETURNING community_id, user_id, role, joined_at
            "#,
        )
        .bind(community_id)
        .bind(user_id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("membership", user_id))?;

        membership_from_row(&row)
    }

    async fn remove_member(&self, community_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM community_members WHERE community_id = $1 AND user_id = $2")
                .bind(community_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_memberships_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM community_members WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn community_stats(
        &self,
        community_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<CommunityStats, StoreError> {
        // Single round trip: one scalar subquery per counter
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM community_members WHERE community_id = $1) AS members,
                (SELECT COUNT(*) FROM community_members WHERE community_id = $1 AND role = 'Admin') AS admins,
                (SELECT COUNT(*) FROM community_members WHERE community_id = $1 AND role = 'Resident') AS residents,
                (SELECT COUNT(*) FROM community_members WHERE community_id = $1 AND role = 'Guest') AS guests,
                (SELECT COUNT(*) FROM id_verifications v
                    JOIN community_members m ON m.user_id = v.user_id AND m.community_id = $1
                    WHERE v.status = 'pending') AS pending_verifications,
                (SELECT COUNT(*) FROM complaints
                    WHERE community_id = $1 AND status IN ('open', 'in_progress')) AS open_complaints,
                (SELECT COUNT(*) FROM polls
                    WHERE community_id = $1 AND (closes_at IS NULL OR closes_at > $2)) AS active_polls,
                (SELECT COUNT(*) FROM announcements WHERE community_id = $1) AS announcements,
                (SELECT COUNT(*) FROM feedback WHERE community_id = $1) AS feedback_count,
                (SELECT AVG(rating)::float8 FROM feedback WHERE community_id = $1) AS average_rating
            "#,
        )
        .bind(community_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(CommunityStats {
            members: row.try_get("members")?,
            admins: row.try_get("admins")?,
            residents: row.try_get("residents")?,
            guests: row.try_get("guests")?,
            pending_verifications: row.try_get("pending_verifications")?,
            open_complaints: row.try_get("open_complaints")?,
            active_polls: row.try_get("active_polls")?,
            announcements: row.try_get("announcements")?,
            feedback_count: row.try_get("feedback_count")?,
            average_rating: row.try_get("average_rating")?,
        })
    }
}
