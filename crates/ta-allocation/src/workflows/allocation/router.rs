use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Actor, CourseId, StudentId};
use super::notify::{Broadcaster, Notifier};
use super::rounds::RoundTracker;
use super::service::{AllocationEngine, AllocationError, AllocationRequest, DeallocationRequest};
use crate::store::EntityStore;

/// Body shared by the allocate and deallocate endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    pub student_id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub actor_role: String,
    #[serde(default)]
    pub actor_id: String,
}

impl TransitionPayload {
    fn actor(&self) -> Actor {
        Actor::from_role(&self.actor_role, &self.actor_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezePayload {
    pub student_id: String,
}

/// Router exposing the allocation transitions, the audit log and the allocation listing.
pub fn allocation_router<S, N, B>(engine: Arc<AllocationEngine<S, N, B>>) -> Router
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    B: Broadcaster + 'static,
{
    Router::new()
        .route("/api/v1/allocations", get(listing_handler::<S, N, B>))
        .route(
            "/api/v1/allocations/allocate",
            post(allocate_handler::<S, N, B>),
        )
        .route(
            "/api/v1/allocations/deallocate",
            post(deallocate_handler::<S, N, B>),
        )
        .route("/api/v1/allocations/freeze", post(freeze_handler::<S, N, B>))
        .route("/api/v1/allocations/logs", get(logs_handler::<S, N, B>))
        .with_state(engine)
}

/// Router for the round tracker.
pub fn round_router<S>(tracker: Arc<RoundTracker<S>>) -> Router
where
    S: EntityStore + 'static,
{
    Router::new()
        .route("/api/v1/rounds", get(round_history_handler::<S>))
        .route("/api/v1/rounds/current", get(current_round_handler::<S>))
        .route("/api/v1/rounds/start", post(start_round_handler::<S>))
        .route("/api/v1/rounds/end", post(end_round_handler::<S>))
        .with_state(tracker)
}

pub(crate) fn status_for(error: &AllocationError) -> StatusCode {
    match error {
        AllocationError::NotFound { .. } => StatusCode::NOT_FOUND,
        AllocationError::TransactionConflict { .. } => StatusCode::CONFLICT,
        AllocationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

pub(crate) fn error_response(error: AllocationError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(error = %error, "allocation request failed");
    }
    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

fn message(text: &str) -> Response {
    (StatusCode::OK, Json(json!({ "message": text }))).into_response()
}

pub(crate) async fn allocate_handler<S, N, B>(
    State(engine): State<Arc<AllocationEngine<S, N, B>>>,
    Json(payload): Json<TransitionPayload>,
) -> Response
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    B: Broadcaster + 'static,
{
    let Some(course_id) = payload.course_id.clone().filter(|id| !id.trim().is_empty()) else {
        let body = json!({ "error": "courseId is required" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    let request = AllocationRequest {
        student: StudentId::new(payload.student_id.trim()),
        course: CourseId::new(course_id.trim()),
        actor: payload.actor(),
    };

    match engine.allocate(&request) {
        Ok(_) => message("Student allocated successfully"),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn deallocate_handler<S, N, B>(
    State(engine): State<Arc<AllocationEngine<S, N, B>>>,
    Json(payload): Json<TransitionPayload>,
) -> Response
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    B: Broadcaster + 'static,
{
    let request = DeallocationRequest {
        student: StudentId::new(payload.student_id.trim()),
        course: payload
            .course_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(CourseId::new),
        actor: payload.actor(),
    };

    match engine.deallocate(&request) {
        Ok(_) => message("Student deallocated successfully"),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn freeze_handler<S, N, B>(
    State(engine): State<Arc<AllocationEngine<S, N, B>>>,
    Json(payload): Json<FreezePayload>,
) -> Response
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    B: Broadcaster + 'static,
{
    match engine.freeze(&StudentId::new(payload.student_id.trim())) {
        Ok(_) => message("Student allocation freezed successfully"),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn logs_handler<S, N, B>(
    State(engine): State<Arc<AllocationEngine<S, N, B>>>,
) -> Response
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    B: Broadcaster + 'static,
{
    match engine.logs() {
        Ok(logs) => (StatusCode::OK, Json(logs)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn listing_handler<S, N, B>(
    State(engine): State<Arc<AllocationEngine<S, N, B>>>,
) -> Response
where
    S: EntityStore + 'static,
    N: Notifier + 'static,
    B: Broadcaster + 'static,
{
    match engine.allocations() {
        Ok(rows) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": rows })),
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn round_history_handler<S>(State(tracker): State<Arc<RoundTracker<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match tracker.history() {
        Ok(rounds) => (StatusCode::OK, Json(rounds)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn current_round_handler<S>(State(tracker): State<Arc<RoundTracker<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match tracker.current() {
        Ok(Some(round)) => (StatusCode::OK, Json(round)).into_response(),
        Ok(None) => error_response(AllocationError::NoActiveRound),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn start_round_handler<S>(State(tracker): State<Arc<RoundTracker<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match tracker.start_next() {
        Ok(round) => (StatusCode::CREATED, Json(round)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn end_round_handler<S>(State(tracker): State<Arc<RoundTracker<S>>>) -> Response
where
    S: EntityStore + 'static,
{
    match tracker.end_current() {
        Ok(round) => (StatusCode::OK, Json(round)).into_response(),
        Err(error) => error_response(error),
    }
}
