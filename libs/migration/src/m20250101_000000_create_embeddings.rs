use sea_orm_migration::prelude::*;

/// Width of the `embeddings.embedding` column. A model trained with a
/// different `-dim` needs a new migration that alters this column.
pub const EMBEDDING_DIM: usize = 50;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector")
            .await?;

        db.execute_unprepared(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                item      TEXT PRIMARY KEY,
                embedding vector({EMBEDDING_DIM}) NOT NULL,
                updated   TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ))
        .await?;

        // Cosine distance is what the recommendation query orders by
        db.execute_unprepared(
            r#"
            CREATE INDEX IF NOT EXISTS embeddings_embedding_idx
                ON embeddings USING hnsw (embedding vector_cosine_ops)
            "#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS embeddings")
            .await?;

        // The vector extension is left installed; other schemas may use it

        Ok(())
    }
}
