use std::sync::Arc;

use crate::services::TodoService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TodoService>,
}

impl AppState {
    pub fn new(service: TodoService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
