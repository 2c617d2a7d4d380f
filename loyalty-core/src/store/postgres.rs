// File: loyalty-core/src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use crate::db::Database;
use crate::store::backend::KvBackend;
use crate::Error;

/// Durable backend over the `kv_store` table.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: Pool<Postgres>,
}

impl PostgresBackend {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}

#[async_trait]
impl KvBackend for PostgresBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let row = sqlx::query(
            r#"
            SELECT value
            FROM kv_store
            WHERE key = $1
            "#,
        )
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key)
            DO UPDATE SET
               value      = EXCLUDED.value,
               updated_at = NOW()
            "#,
        )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn put_bulk(&self, kvs: &HashMap<String, String>) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in kvs {
            sqlx::query(
                r#"
                INSERT INTO kv_store (key, value, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (key)
                DO UPDATE SET
                   value      = EXCLUDED.value,
                   updated_at = NOW()
                "#,
            )
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<HashMap<String, String>, Error> {
        // LIKE would treat '_' and '%' in the prefix as wildcards.
        let rows = sqlx::query(
            r#"
            SELECT key, value
            FROM kv_store
            WHERE left(key, char_length($1)) = $1
            "#,
        )
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for r in rows {
            out.insert(r.try_get("key")?, r.try_get("value")?);
        }
        Ok(out)
    }
}
