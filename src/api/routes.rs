//! REST endpoints for creating and reading tasks.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::tasks::{CreateTaskRequest, TaskStore};
use crate::worker::Dispatcher;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the Axum router for the task API.
pub fn task_routes(store: Arc<TaskStore>, dispatcher: Arc<Dispatcher>) -> Router {
    let state = AppState { store, dispatcher };

    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_body(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "task-scheduler",
        "dispatcher": state.dispatcher.stats(),
    }))
}

// ── Tasks ───────────────────────────────────────────────────────────────

async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list().await)
}

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> impl IntoResponse {
    if body.title.trim().is_empty() {
        return error_body(StatusCode::BAD_REQUEST, "Task title must not be empty");
    }

    let task = match state.store.create(body.title, body.description).await {
        Ok(task) => task,
        Err(e) => {
            error!(error = %e, "Failed to create task");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save task");
        }
    };

    // Execution happens after the response; the record is already durable.
    match state.dispatcher.submit(task.clone()).await {
        Ok(()) => {
            info!(task_id = %task.id, title = %task.title, "Task accepted");
            (StatusCode::CREATED, Json(json!({ "task": task })))
        }
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Task saved but not scheduled");
            error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                "Scheduler is shutting down; task saved as pending",
            )
        }
    }
}

async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    // IDs are opaque to clients: anything that is not a known ID is simply absent.
    let found = match Uuid::parse_str(&id) {
        Ok(id) => state.store.get(id).await,
        Err(_) => None,
    };

    match found {
        Some(task) => (StatusCode::OK, Json(json!(task))),
        None => error_body(StatusCode::NOT_FOUND, "Task not found"),
    }
}
