pub use sea_orm_migration::prelude::*;

mod m20250101_000000_create_embeddings;

pub use m20250101_000000_create_embeddings::EMBEDDING_DIM;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20250101_000000_create_embeddings::Migration)]
    }
}
