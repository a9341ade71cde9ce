pub mod repository;

use async_trait::async_trait;

use crate::models::Todo;

pub use repository::SqliteTodoStore;

/// Result of a batch delete. Deletes are all-or-nothing: when `missing` is
/// non-empty nothing was removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub removed: u64,
    pub missing: Vec<i64>,
}

#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn insert(&self, subject: &str, description: &str) -> Result<Todo, sqlx::Error>;
    /// Point lookup. Updates do not need it since `update_by_id` returns the row.
    async fn select_by_id(&self, id: i64) -> Result<Option<Todo>, sqlx::Error>;
    /// Records with `id > after_id` in ascending id order. `limit <= 0` means no limit.
    async fn select_range(&self, after_id: i64, limit: i64) -> Result<Vec<Todo>, sqlx::Error>;
    async fn update_by_id(
        &self,
        id: i64,
        subject: &str,
        description: &str,
    ) -> Result<Option<Todo>, sqlx::Error>;
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<DeleteOutcome, sqlx::Error>;
    async fn ping(&self) -> Result<(), sqlx::Error>;
}
