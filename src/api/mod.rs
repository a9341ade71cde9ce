use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Query;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::MethodFilter;
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::AppError;
use crate::models::*;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/todos",
            get(read_todos)
                .post(create_todo)
                .put(update_todo)
                .delete(delete_todos)
                // explicit so HEAD does not fall through to the GET handler
                .on(MethodFilter::HEAD, method_not_allowed)
                .fallback(method_not_allowed),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.service.health().await?;
    Ok(StatusCode::OK)
}

async fn create_todo(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: CreateTodoRequest = decode(&body)?;
    if req.subject.is_empty() {
        return Err(AppError::InvalidInput("Subject is required".to_string()));
    }

    let todo = state.service.create_todo(&req.subject, &req.description).await?;
    Ok(encode(&CreateTodoResponse { todo }))
}

async fn update_todo(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: UpdateTodoRequest = decode(&body)?;
    if req.subject.is_empty() {
        return Err(AppError::InvalidInput("Subject is required".to_string()));
    }

    let todo = state
        .service
        .update_todo(req.id, &req.subject, &req.description)
        .await?;
    Ok(encode(&UpdateTodoResponse { todo }))
}

async fn read_todos(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let req = read_request(&params);
    let todos = state.service.read_todos(req.prev_id, req.size).await?;
    Ok(encode(&ReadTodoResponse { todos }))
}

async fn delete_todos(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let req: DeleteTodoRequest = decode(&body)?;
    if req.ids.is_empty() {
        return Err(AppError::InvalidInput("IDs are required".to_string()));
    }

    state.service.delete_todos(&req.ids).await?;
    Ok(encode(&DeleteTodoResponse {}))
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// Missing or unparsable values read as 0.
fn read_request(params: &HashMap<String, String>) -> ReadTodoRequest {
    let int = |key: &str| {
        params
            .get(key)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
    };

    ReadTodoRequest {
        prev_id: int("prev_id"),
        size: int("size"),
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::InvalidInput(e.to_string()))
}

// The status is already decided by the time encoding runs, so a failure here
// is only logged.
fn encode<T: Serialize>(res: &T) -> Response {
    match serde_json::to_vec(res) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            error!("failed to encode response: {}", e);
            StatusCode::OK.into_response()
        }
    }
}
