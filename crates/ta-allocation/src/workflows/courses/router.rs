use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{CourseChanges, CourseDraft, CourseFilter};
use super::service::{CatalogError, CourseCatalog};
use crate::store::EntityStore;
use crate::workflows::allocation::{CourseId, ProfessorId};

/// Uploads accept a single course or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DraftBatch {
    Many(Vec<CourseDraft>),
    One(CourseDraft),
}

impl DraftBatch {
    fn into_drafts(self) -> Vec<CourseDraft> {
        match self {
            DraftBatch::Many(drafts) => drafts,
            DraftBatch::One(draft) => vec![draft],
        }
    }
}

pub fn course_router<S>(catalog: Arc<CourseCatalog<S>>) -> Router
where
    S: EntityStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/courses",
            get(list_handler::<S>).post(add_handler::<S>),
        )
        .route(
            "/api/v1/courses/:course_id",
            get(get_handler::<S>)
                .put(update_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .route(
            "/api/v1/courses/professor/:professor_id",
            get(professor_handler::<S>),
        )
        .with_state(catalog)
}

pub(crate) fn status_for(error: &CatalogError) -> StatusCode {
    match error {
        CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
        CatalogError::InvalidDepartment(_)
        | CatalogError::UnknownProfessor(_)
        | CatalogError::Invalid(_) => StatusCode::BAD_REQUEST,
        CatalogError::TransactionConflict { .. } => StatusCode::CONFLICT,
        CatalogError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: CatalogError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "course request failed");
    }
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

pub(crate) async fn list_handler<S>(
    State(catalog): State<Arc<CourseCatalog<S>>>,
    Query(filter): Query<CourseFilter>,
) -> Response
where
    S: EntityStore + 'static,
{
    match catalog.list(&filter) {
        Ok(courses) => (StatusCode::OK, Json(courses)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn add_handler<S>(
    State(catalog): State<Arc<CourseCatalog<S>>>,
    Json(batch): Json<DraftBatch>,
) -> Response
where
    S: EntityStore + 'static,
{
    match catalog.add(batch.into_drafts()) {
        Ok(report) => (
            StatusCode::CREATED,
            Json(json!({
                "message": "Courses added successfully",
                "stored": report.stored,
                "invalidCourses": report.invalid_courses,
            })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<S>(
    State(catalog): State<Arc<CourseCatalog<S>>>,
    Path(course_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match catalog.get(&CourseId::new(course_id)) {
        Ok(course) => (StatusCode::OK, Json(course)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_handler<S>(
    State(catalog): State<Arc<CourseCatalog<S>>>,
    Path(course_id): Path<String>,
    Json(changes): Json<CourseChanges>,
) -> Response
where
    S: EntityStore + 'static,
{
    match catalog.update(&CourseId::new(course_id), changes) {
        Ok(course) => (
            StatusCode::OK,
            Json(json!({ "message": "Course updated successfully", "course": course })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler<S>(
    State(catalog): State<Arc<CourseCatalog<S>>>,
    Path(course_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match catalog.delete(&CourseId::new(course_id)) {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "message": "Course deleted successfully" })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn professor_handler<S>(
    State(catalog): State<Arc<CourseCatalog<S>>>,
    Path(professor_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    match catalog.for_professor(&ProfessorId::new(professor_id)) {
        Ok(courses) => (
            StatusCode::OK,
            Json(json!({ "success": true, "courses": courses })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}
