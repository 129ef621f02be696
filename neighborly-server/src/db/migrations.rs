//! Schema owned by this repo
//!
//! Every statement is idempotent, so `run` is safe at every startup.
//! Rows owned by a user, community, poll or conversation cascade with it;
//! authored content outlives its author with the reference set to NULL.

use sqlx::PgPool;

const TABLES: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'unverified',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "sessions",
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "login_codes",
        r#"
        CREATE TABLE IF NOT EXISTS login_codes (
            email TEXT PRIMARY KEY,
            code_hash TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "communities",
        r#"
        CREATE TABLE IF NOT EXISTS communities (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            description TEXT,
            created_by UUID REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "community_members",
        r#"
        CREATE TABLE IF NOT EXISTS community_members (
            community_id UUID NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role TEXT NOT NULL DEFAULT 'Resident',
            joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (community_id, user_id)
        )
        "#,
    ),
    (
        "id_verifications",
        r#"
        CREATE TABLE IF NOT EXISTS id_verifications (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            document_type TEXT NOT NULL,
            document_key TEXT NOT NULL,
            content_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            submitted_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            reviewed_at TIMESTAMPTZ,
            reviewed_by UUID REFERENCES users(id) ON DELETE SET NULL,
            approved_at TIMESTAMPTZ,
            rejection_reason TEXT
        )
        "#,
    ),
    (
        "notifications",
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            link TEXT,
            read_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "announcements",
        r#"
        CREATE TABLE IF NOT EXISTS announcements (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            community_id UUID NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            author_id UUID REFERENCES users(id) ON DELETE SET NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            pinned BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "complaints",
        r#"
        CREATE TABLE IF NOT EXISTS complaints (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            community_id UUID NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            author_id UUID REFERENCES users(id) ON DELETE SET NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            status TEXT NOT NULL DEFAULT 'open',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "polls",
        r#"
        CREATE TABLE IF NOT EXISTS polls (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            community_id UUID NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            author_id UUID REFERENCES users(id) ON DELETE SET NULL,
            question TEXT NOT NULL,
            allow_multiple BOOLEAN NOT NULL DEFAULT FALSE,
            closes_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "poll_options",
        r#"
        CREATE TABLE IF NOT EXISTS poll_options (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            poll_id UUID NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            label TEXT NOT NULL,
            position INTEGER NOT NULL,
            UNIQUE (poll_id, position)
        )
        "#,
    ),
    (
        "poll_votes",
        r#"
        CREATE TABLE IF NOT EXISTS poll_votes (
            poll_id UUID NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            option_id UUID NOT NULL REFERENCES poll_options(id) ON DELETE CASCADE,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (poll_id, option_id, user_id)
        )
        "#,
    ),
    (
        "conversations",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            community_id UUID NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            created_by UUID REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "conversation_participants",
        r#"
        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (conversation_id, user_id)
        )
        "#,
    ),
    (
        "messages",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            conversation_id UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id UUID REFERENCES users(id) ON DELETE SET NULL,
            body TEXT,
            gif_url TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK (body IS NOT NULL OR gif_url IS NOT NULL)
        )
        "#,
    ),
    (
        "message_reads",
        r#"
        CREATE TABLE IF NOT EXISTS message_reads (
            message_id UUID NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            read_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (message_id, user_id)
        )
        "#,
    ),
    (
        "feedback",
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            community_id UUID NOT NULL REFERENCES communities(id) ON DELETE CASCADE,
            user_id UUID REFERENCES users(id) ON DELETE SET NULL,
            category TEXT NOT NULL,
            message TEXT NOT NULL,
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            sentiment TEXT NOT NULL,
            sentiment_score DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "topic_cache",
        r#"
        CREATE TABLE IF NOT EXISTS topic_cache (
            text_hash TEXT PRIMARY KEY,
            result JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "sentiment_cache",
        r#"
        CREATE TABLE IF NOT EXISTS sentiment_cache (
            text_hash TEXT PRIMARY KEY,
            result JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_sessions_email ON sessions(email)",
    "CREATE INDEX IF NOT EXISTS idx_members_user ON community_members(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_verifications_user ON id_verifications(user_id, submitted_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_verifications_pending ON id_verifications(user_id) WHERE status = 'pending'",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_unread ON notifications(user_id) WHERE read_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_announcements_community ON announcements(community_id, pinned DESC, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_complaints_community ON complaints(community_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_polls_community ON polls(community_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_poll_votes_option ON poll_votes(option_id)",
    "CREATE INDEX IF NOT EXISTS idx_participants_user ON conversation_participants(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_community ON feedback(community_id, created_at DESC)",
];

/// Create every table and index.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running migrations...");

    for (table, ddl) in TABLES {
        tracing::debug!(table, "ensuring table");
        sqlx::query(ddl).execute(pool).await?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!(tables = TABLES.len(), indexes = INDEXES.len(), "Migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_created_before_their_dependents() {
        let order: Vec<&str> = TABLES.iter().map(|(name, _)| *name).collect();
        for (position, (_, ddl)) in TABLES.iter().enumerate() {
            for referenced in ddl.split("REFERENCES ").skip(1) {
                let target = referenced.split('(').next().unwrap_or_default().trim();
                let target_position = order
                    .iter()
                    .position(|t| *t == target)
                    .unwrap_or_else(|| panic!("unknown table {target}"));
                assert!(target_position <= position, "{target} must precede {}", order[position]);
            }
        }
    }

    #[test]
    fn statements_are_idempotent() {
        assert!(TABLES.iter().all(|(_, ddl)| ddl.contains("IF NOT EXISTS")));
        assert!(INDEXES.iter().all(|ddl| ddl.contains("IF NOT EXISTS")));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn migrations_run_twice() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = crate::db::create_pool(&url, &Default::default())
            .await
            .expect("pool creation failed");
        run(&pool).await.expect("first run");
        run(&pool).await.expect("second run");
    }
}
