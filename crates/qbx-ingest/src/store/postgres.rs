//! PostgreSQL envelope store
//!
//! Landing tables are plain append-only tables with no key on `id`; the
//! table (and its schema) is created on first append when missing.
//! `insert_if_absent` adds a unique index on `id` before using
//! `ON CONFLICT DO NOTHING`.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use tracing::{debug, info};

use super::{EnvelopeStore, TableRef};
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::loader::EnvelopeRow;

/// Ids bound per existence query
const EXISTENCE_CHUNK: usize = 500;

/// Rows per INSERT statement (8 binds each, well under the 65535 limit)
const INSERT_CHUNK: usize = 1000;

pub struct PgEnvelopeStore {
    pool: PgPool,
}

impl PgEnvelopeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to destination database");
        Ok(Self::new(pool))
    }

    /// Apply the bundled migrations creating the built-in landing tables
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    async fn ensure_table(&self, table: &TableRef) -> Result<()> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", table.schema()))
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT NOT NULL,
                payload TEXT NOT NULL,
                ingested_at_utc TIMESTAMPTZ NOT NULL,
                extract_window_start_utc TIMESTAMPTZ NOT NULL,
                extract_window_end_utc TIMESTAMPTZ NOT NULL,
                page_number INTEGER NOT NULL,
                page_size INTEGER NOT NULL,
                request_payload TEXT NOT NULL
            )
            "#,
            table.qualified()
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn ensure_unique_id(&self, table: &TableRef) -> Result<()> {
        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {}_id_key ON {} (id)",
            table.table(),
            table.qualified()
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn insert_builder<'a>(table: &TableRef, rows: &'a [EnvelopeRow]) -> QueryBuilder<'a, Postgres> {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            INSERT INTO {} (
                id, payload, ingested_at_utc, extract_window_start_utc,
                extract_window_end_utc, page_number, page_size, request_payload
            )
            "#,
            table.qualified()
        ));

        query_builder.push_values(rows, |mut b, row| {
            b.push_bind(&row.id)
                .push_bind(&row.payload)
                .push_bind(row.ingested_at_utc)
                .push_bind(row.extract_window_start_utc)
                .push_bind(row.extract_window_end_utc)
                .push_bind(row.page_number)
                .push_bind(row.page_size)
                .push_bind(&row.request_payload);
        });

        query_builder
    }
}

#[async_trait]
impl EnvelopeStore for PgEnvelopeStore {
    async fn existing_ids(&self, table: &TableRef, ids: &[String]) -> Result<HashSet<String>> {
        let mut existing = HashSet::new();

        for chunk in ids.chunks(EXISTENCE_CHUNK) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("SELECT id FROM {} WHERE id IN (", table.qualified()));

            let mut separated = query_builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows = query_builder.build().fetch_all(&self.pool).await?;

            for row in rows {
                existing.insert(row.try_get::<String, _>("id")?);
            }
        }

        debug!(table = %table, checked = ids.len(), existing = existing.len(), "Existence check");
        Ok(existing)
    }

    async fn append(&self, table: &TableRef, rows: &[EnvelopeRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.ensure_table(table).await?;

        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for chunk in rows.chunks(INSERT_CHUNK) {
            written += Self::insert_builder(table, chunk)
                .build()
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn insert_if_absent(&self, table: &TableRef, rows: &[EnvelopeRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.ensure_table(table).await?;
        self.ensure_unique_id(table).await?;

        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut query_builder = Self::insert_builder(table, chunk);
            query_builder.push(" ON CONFLICT (id) DO NOTHING");

            written += query_builder
                .build()
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }
}
