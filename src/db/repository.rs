use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::{DeleteOutcome, TodoStore};
use crate::models::Todo;

pub async fn open_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Single-connection pool over a private in-memory database. Every
/// connection to `sqlite::memory:` is its own database, so the pool must
/// never open a second one or drop the first.
pub async fn open_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}

pub async fn run_migrations(db: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db).await
}

#[derive(Clone)]
pub struct SqliteTodoStore {
    db: SqlitePool,
}

impl SqliteTodoStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TodoStore for SqliteTodoStore {
    async fn insert(&self, subject: &str, description: &str) -> Result<Todo, sqlx::Error> {
        let now = Utc::now();

        let id = sqlx::query(
            r#"
            INSERT INTO todos (subject, description, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            "#,
        )
        .bind(subject)
        .bind(description)
        .bind(now)
        .execute(&self.db)
        .await?
        .last_insert_rowid();

        Ok(Todo {
            id,
            subject: subject.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn select_by_id(&self, id: i64) -> Result<Option<Todo>, sqlx::Error> {
        sqlx::query_as::<_, Todo>(
            "SELECT id, subject, description, created_at, updated_at FROM todos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
    }

    async fn select_range(&self, after_id: i64, limit: i64) -> Result<Vec<Todo>, sqlx::Error> {
        // sqlite treats a negative LIMIT as unbounded
        let limit = if limit > 0 { limit } else { -1 };

        sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, subject, description, created_at, updated_at
            FROM todos
            WHERE id > ?1
            ORDER BY id ASC
            LIMIT ?2
            "#,
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await
    }

    async fn update_by_id(
        &self,
        id: i64,
        subject: &str,
        description: &str,
    ) -> Result<Option<Todo>, sqlx::Error> {
        let now = Utc::now();

        sqlx::query_as::<_, Todo>(
            r#"
            UPDATE todos
            SET subject = ?1,
                description = ?2,
                updated_at = ?3
            WHERE id = ?4
            RETURNING id, subject, description, created_at, updated_at
            "#,
        )
        .bind(subject)
        .bind(description)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.db)
        .await
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<DeleteOutcome, sqlx::Error> {
        if ids.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        // bound once as a JSON array so the batch size is not capped by
        // sqlite's host parameter limit
        let id_list = serde_json::to_string(ids)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let mut tx = self.db.begin().await?;

        let existing: BTreeSet<i64> = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM todos WHERE id IN (SELECT value FROM json_each(?1))",
        )
        .bind(&id_list)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !missing.is_empty() {
            tx.rollback().await?;
            return Ok(DeleteOutcome { removed: 0, missing });
        }

        let removed = sqlx::query(
            "DELETE FROM todos WHERE id IN (SELECT value FROM json_each(?1))",
        )
        .bind(&id_list)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        Ok(DeleteOutcome {
            removed,
            missing: Vec::new(),
        })
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }
}
