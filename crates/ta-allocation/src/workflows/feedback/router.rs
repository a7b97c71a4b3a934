use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

use super::domain::{FeedbackEdit, FeedbackId};
use super::service::{FeedbackError, FeedbackService};
use crate::store::EntityStore;
use crate::workflows::allocation::ProfessorId;

/// Router for the feedback window and professor feedback forms.
pub fn feedback_router<S>(service: Arc<FeedbackService<S>>) -> Router
where
    S: EntityStore + 'static,
{
    Router::new()
        .route("/api/v1/feedback", get(all_handler::<S>))
        .route("/api/v1/feedback/start", post(start_handler::<S>))
        .route("/api/v1/feedback/close", post(close_handler::<S>))
        .route("/api/v1/feedback/status", get(status_handler::<S>))
        .route("/api/v1/feedback/export", get(export_handler::<S>))
        .route(
            "/api/v1/feedback/professor/:professor_id",
            get(professor_handler::<S>),
        )
        .route("/api/v1/feedback/:feedback_id", put(edit_handler::<S>))
        .with_state(service)
}

pub(crate) fn status_for(error: &FeedbackError) -> StatusCode {
    match error {
        FeedbackError::Closed => StatusCode::FORBIDDEN,
        FeedbackError::NotFound(_) | FeedbackError::NoSubmissions => StatusCode::NOT_FOUND,
        FeedbackError::TransactionConflict { .. } => StatusCode::CONFLICT,
        FeedbackError::Export(_) | FeedbackError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: FeedbackError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "feedback request failed");
    }
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

pub(crate) async fn start_handler<S>(State(service): State<Arc<FeedbackService<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match service.start() {
        Ok(created) => (
            StatusCode::OK,
            Json(json!({ "message": "Feedback started", "placeholders": created })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn close_handler<S>(State(service): State<Arc<FeedbackService<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match service.close() {
        Ok(()) => (StatusCode::OK, Json(json!({ "message": "Feedback closed" }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S>(State(service): State<Arc<FeedbackService<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match service.is_open() {
        Ok(active) => (StatusCode::OK, Json(json!({ "active": active }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn all_handler<S>(State(service): State<Arc<FeedbackService<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match service.all() {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn professor_handler<S>(
    State(service): State<Arc<FeedbackService<S>>>,
    Path(professor_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.for_professor(&ProfessorId::new(professor_id)) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn edit_handler<S>(
    State(service): State<Arc<FeedbackService<S>>>,
    Path(feedback_id): Path<String>,
    Json(edit): Json<FeedbackEdit>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.edit(&FeedbackId::new(feedback_id), edit) {
        Ok(feedback) => (
            StatusCode::OK,
            Json(json!({ "message": "Feedback updated successfully", "feedback": feedback })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn export_handler<S>(State(service): State<Arc<FeedbackService<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match service.export_csv() {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"TA_Feedbacks.csv\"",
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}
