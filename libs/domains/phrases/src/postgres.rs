//! pgvector-backed implementation of [`EmbeddingRepository`].
//!
//! Vectors travel as pgvector text literals (`[0.1,0.2]`) cast with
//! `::vector`, so no driver-level vector type is needed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, FromQueryResult,
    Statement, TransactionTrait,
};

use crate::error::{PhraseError, PhraseResult};
use crate::models::EmbeddingRecord;
use crate::repository::{EmbeddingRepository, ReindexTransaction};

/// PostgreSQL implementation of EmbeddingRepository
#[derive(Clone)]
pub struct PgEmbeddingRepository {
    db: DatabaseConnection,
}

impl PgEmbeddingRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct ItemRow {
    item: String,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct EmbeddingRow {
    item: String,
    embedding: String,
    updated: DateTime<Utc>,
}

impl TryFrom<EmbeddingRow> for EmbeddingRecord {
    type Error = PhraseError;

    fn try_from(row: EmbeddingRow) -> Result<Self, Self::Error> {
        let vector = parse_vector_literal(&row.embedding).ok_or_else(|| {
            PhraseError::StoreQuery(format!("Malformed vector stored for item {}", row.item))
        })?;
        Ok(Self {
            item: row.item,
            vector,
            updated: row.updated,
        })
    }
}

/// pgvector text form of `vector`.
pub fn vector_literal(vector: &[f32]) -> String {
    let values: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Parse pgvector's text output, `None` when it is not a bracketed float list.
pub fn parse_vector_literal(text: &str) -> Option<Vec<f32>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok())
        .collect()
}

fn query_error(e: sea_orm::DbErr) -> PhraseError {
    PhraseError::StoreQuery(format!("Database error: {}", e))
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn begin_reindex(&self) -> PhraseResult<Box<dyn ReindexTransaction>> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| PhraseError::Transaction(format!("begin: {}", e)))?;

        Ok(Box::new(PgReindexTransaction { txn }))
    }

    async fn nearest(&self, vector: &[f32], limit: u32) -> PhraseResult<Vec<String>> {
        let sql = r#"
            SELECT item
            FROM embeddings
            ORDER BY embedding <=> $1::vector, item
            LIMIT $2
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [vector_literal(vector).into(), i64::from(limit).into()],
        );

        let rows = ItemRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .map_err(query_error)?;

        Ok(rows.into_iter().map(|row| row.item).collect())
    }

    async fn count(&self) -> PhraseResult<u64> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            "SELECT COUNT(*) AS count FROM embeddings",
        );

        let row = CountRow::find_by_statement(stmt)
            .one(&self.db)
            .await
            .map_err(query_error)?;

        Ok(row.map(|r| r.count.max(0) as u64).unwrap_or(0))
    }

    async fn list(&self) -> PhraseResult<Vec<EmbeddingRecord>> {
        let stmt = Statement::from_string(
            DbBackend::Postgres,
            "SELECT item, embedding::text AS embedding, updated FROM embeddings ORDER BY item",
        );

        EmbeddingRow::find_by_statement(stmt)
            .all(&self.db)
            .await
            .map_err(query_error)?
            .into_iter()
            .map(EmbeddingRecord::try_from)
            .collect()
    }
}

/// Reindex on a dedicated connection; dropping it rolls back.
struct PgReindexTransaction {
    txn: DatabaseTransaction,
}

#[async_trait]
impl ReindexTransaction for PgReindexTransaction {
    async fn clear(&mut self) -> PhraseResult<()> {
        let stmt = Statement::from_string(DbBackend::Postgres, "DELETE FROM embeddings");

        self.txn
            .execute_raw(stmt)
            .await
            .map_err(|e| PhraseError::Transaction(format!("clear: {}", e)))?;

        Ok(())
    }

    async fn upsert(&mut self, item: &str, vector: &[f32]) -> PhraseResult<()> {
        let sql = r#"
            INSERT INTO embeddings (item, embedding, updated)
            VALUES ($1, $2::vector, NOW())
            ON CONFLICT (item) DO UPDATE
            SET embedding = EXCLUDED.embedding,
                updated = NOW()
        "#;

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [item.into(), vector_literal(vector).into()],
        );

        self.txn
            .execute_raw(stmt)
            .await
            .map_err(|e| PhraseError::Transaction(format!("upsert {}: {}", item, e)))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> PhraseResult<()> {
        self.txn
            .commit()
            .await
            .map_err(|e| PhraseError::Transaction(format!("commit: {}", e)))
    }
}
