use async_trait::async_trait;
use sqlx::Row;

use super::PgStore;
use crate::store::{AnalysisCacheStore, AnalysisKind, StoreError};

#[async_trait]
impl AnalysisCacheStore for PgStore {
    async fn cached_analysis(
        &self,
        kind: AnalysisKind,
        text_hash: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        // Table name comes from a closed enum, never from input
        let row = sqlx::query(&format!(
            "SELECT result FROM {} WHERE text_hash = $1",
            kind.table()
        ))
        .bind(text_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("result")?)),
            None => Ok(None),
        }
    }

    async fn store_analysis(
        &self,
        kind: AnalysisKind,
        text_hash: &str,
        result: &serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO {} (text_hash, result)
            VALUES ($1, $2)
            ON CONFLICT (text_hash) DO UPDATE SET result = EXCLUDED.result, created_at = NOW()
            "#,
            kind.table()
        ))
        .bind(text_hash)
        .bind(result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
