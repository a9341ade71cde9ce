use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::db::TodoStore;
use crate::error::AppError;
use crate::models::Todo;

pub struct TodoService {
    store: Arc<dyn TodoStore>,
}

impl TodoService {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }

    pub async fn create_todo(&self, subject: &str, description: &str) -> Result<Todo, AppError> {
        require_subject(subject)?;

        let todo = self.store.insert(subject, description).await?;
        info!("Created todo {}", todo.id);
        Ok(todo)
    }

    pub async fn update_todo(
        &self,
        id: i64,
        subject: &str,
        description: &str,
    ) -> Result<Todo, AppError> {
        require_subject(subject)?;

        let todo = self
            .store
            .update_by_id(id, subject, description)
            .await?
            .ok_or(AppError::NotFound(id))?;
        info!("Updated todo {}", todo.id);
        Ok(todo)
    }

    /// Records after `prev_id` in ascending id order, at most `size` of them
    /// when `size > 0`.
    pub async fn read_todos(&self, prev_id: i64, size: i64) -> Result<Vec<Todo>, AppError> {
        let todos = self.store.select_range(prev_id, size).await?;
        debug!("Read {} todos after {} (size {})", todos.len(), prev_id, size);
        Ok(todos)
    }

    /// Deletes every id or none of them. The first missing id is reported.
    pub async fn delete_todos(&self, ids: &[i64]) -> Result<(), AppError> {
        let ids: Vec<i64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Err(AppError::InvalidInput("IDs are required".to_string()));
        }

        let outcome = self.store.delete_by_ids(&ids).await?;
        if outcome.removed < ids.len() as u64 {
            let missing = outcome.missing.first().copied().unwrap_or(ids[0]);
            warn!("Delete rejected, todo {} not found", missing);
            return Err(AppError::NotFound(missing));
        }

        info!("Deleted {} todos", outcome.removed);
        Ok(())
    }

    pub async fn health(&self) -> Result<(), AppError> {
        self.store.ping().await?;
        Ok(())
    }
}

fn require_subject(subject: &str) -> Result<(), AppError> {
    if subject.is_empty() {
        return Err(AppError::InvalidInput("Subject is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::db::repository::{open_memory_pool, run_migrations};
    use crate::db::{DeleteOutcome, SqliteTodoStore};

    async fn setup_service() -> TodoService {
        let pool = open_memory_pool()
            .await
            .expect("Failed to create test db");
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        TodoService::new(Arc::new(SqliteTodoStore::new(pool)))
    }

    /// Store whose every call fails, for error propagation.
    struct BrokenStore;

    #[async_trait]
    impl TodoStore for BrokenStore {
        async fn insert(&self, _: &str, _: &str) -> Result<Todo, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
        async fn select_by_id(&self, _: i64) -> Result<Option<Todo>, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
        async fn select_range(&self, _: i64, _: i64) -> Result<Vec<Todo>, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
        async fn update_by_id(&self, _: i64, _: &str, _: &str) -> Result<Option<Todo>, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
        async fn delete_by_ids(&self, _: &[i64]) -> Result<DeleteOutcome, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
        async fn ping(&self) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
    }

    #[tokio::test]
    async fn test_create_then_read_first_page() {
        let service = setup_service().await;

        let todo = service.create_todo("buy milk", "").await.unwrap();
        assert_eq!(todo.id, 1);
        assert_eq!(todo.subject, "buy milk");
        assert_eq!(todo.description, "");

        let page = service.read_todos(0, 10).await.unwrap();
        assert_eq!(page, vec![todo]);
    }

    #[tokio::test]
    async fn test_create_assigns_unique_ids() {
        let service = setup_service().await;
        let mut seen = BTreeSet::new();
        for i in 0..10 {
            let todo = service
                .create_todo(&format!("task {}", i), "details")
                .await
                .unwrap();
            assert_eq!(todo.description, "details");
            assert!(seen.insert(todo.id), "duplicate id {}", todo.id);
        }
    }

    #[tokio::test]
    async fn test_create_empty_subject_is_invalid() {
        let service = setup_service().await;
        for description in ["", "something", " "] {
            let err = service.create_todo("", description).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)));
        }
        assert!(service.read_todos(0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_is_visible_to_read() {
        let service = setup_service().await;
        let todo = service.create_todo("original", "first").await.unwrap();

        let updated = service.update_todo(todo.id, "changed", "second").await.unwrap();
        assert_eq!(updated.subject, "changed");

        let page = service.read_todos(0, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].subject, "changed");
        assert_eq!(page[0].description, "second");
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let service = setup_service().await;
        let err = service.update_todo(7, "anything", "").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(7)));
    }

    #[tokio::test]
    async fn test_update_empty_subject_is_invalid() {
        let service = setup_service().await;
        let todo = service.create_todo("keep", "").await.unwrap();
        let err = service.update_todo(todo.id, "", "").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_read_pagination_window() {
        let service = setup_service().await;
        for i in 0..7 {
            service.create_todo(&format!("task {}", i), "").await.unwrap();
        }

        let page = service.read_todos(2, 3).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);

        let all = service.read_todos(0, 0).await.unwrap();
        assert_eq!(all.len(), 7);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        assert!(service.read_todos(7, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_requested() {
        let service = setup_service().await;
        let a = service.create_todo("a", "").await.unwrap();
        let b = service.create_todo("b", "").await.unwrap();

        service.delete_todos(&[a.id, a.id]).await.unwrap();

        let remaining = service.read_todos(0, 0).await.unwrap();
        assert_eq!(remaining, vec![b]);
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_not_found() {
        let service = setup_service().await;
        let err = service.delete_todos(&[999]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(999)));
    }

    #[tokio::test]
    async fn test_delete_partial_keeps_existing() {
        let service = setup_service().await;
        let a = service.create_todo("a", "").await.unwrap();

        let err = service.delete_todos(&[a.id, 999]).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(999)));
        assert_eq!(service.read_todos(0, 0).await.unwrap(), vec![a]);
    }

    #[tokio::test]
    async fn test_delete_empty_is_invalid_before_store() {
        let service = TodoService::new(Arc::new(BrokenStore));
        let err = service.delete_todos(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_store_failures_propagate() {
        let service = TodoService::new(Arc::new(BrokenStore));
        assert!(matches!(
            service.create_todo("x", "").await.unwrap_err(),
            AppError::Store(_)
        ));
        assert!(matches!(
            service.update_todo(1, "x", "").await.unwrap_err(),
            AppError::Store(_)
        ));
        assert!(matches!(
            service.read_todos(0, 0).await.unwrap_err(),
            AppError::Store(_)
        ));
        assert!(matches!(
            service.delete_todos(&[1]).await.unwrap_err(),
            AppError::Store(_)
        ));
        assert!(matches!(service.health().await.unwrap_err(), AppError::Store(_)));
    }
}
