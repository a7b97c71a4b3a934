use std::sync::atomic::Ordering;

use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use futures::stream::{self, Stream};
use serde_json::json;
use ta_allocation::workflows::allocation::{allocation_router, round_router, LiveEvent};
use ta_allocation::workflows::courses::course_router;
use ta_allocation::workflows::feedback::feedback_router;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::infra::{AppState, Services};

/// Every workflow router plus the operational endpoints.
pub(crate) fn with_service_routes(services: &Services) -> Router {
    allocation_router(services.engine.clone())
        .merge(round_router(services.rounds.clone()))
        .merge(feedback_router(services.feedback.clone()))
        .merge(course_router(services.courses.clone()))
        .route("/api/v1/allocations/live", get(live_updates))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    if state.readiness.load(Ordering::Acquire) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

fn sse_event(event: &LiveEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}

/// Server-sent events for every `liveLogs` and `studentUpdated` broadcast.
pub(crate) async fn live_updates(
    Extension(state): Extension<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = state.live.subscribe();
    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => return Some((sse_event(&event), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "live update subscriber fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use futures::StreamExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use ta_allocation::config::AllocationConfig;
    use ta_allocation::store::MemoryStore;
    use ta_allocation::workflows::allocation::{Broadcaster, Placement, Student, StudentId};
    use tower::ServiceExt;

    use crate::infra::MailQueue;

    fn state(services: &Services, ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            live: services.live.clone(),
        }
    }

    fn services() -> Services {
        let (mail, _outbox) = MailQueue::new("allocations@example.edu");
        Services::build(
            Arc::new(MemoryStore::new()),
            mail,
            &AllocationConfig::default(),
        )
    }

    #[tokio::test]
    async fn readiness_reflects_startup_flag() {
        let services = services();
        let app = with_service_routes(&services).layer(Extension(state(&services, false)));

        let response = app
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn workflow_routes_are_mounted() {
        let services = services();
        let app = with_service_routes(&services).layer(Extension(state(&services, true)));

        for uri in ["/health", "/api/v1/rounds", "/api/v1/courses", "/api/v1/feedback/status"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).expect("request"))
                .await
                .expect("router responds");
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn live_stream_forwards_broadcasts() {
        let services = services();
        let app = with_service_routes(&services).layer(Extension(state(&services, true)));

        let response = app
            .oneshot(
                Request::get("/api/v1/allocations/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        services
            .live
            .emit(LiveEvent::StudentUpdated(Student {
                id: StudentId::new("s-1"),
                name: "Asha Rao".to_string(),
                roll_no: "2021001".to_string(),
                email: "asha@students.example.edu".to_string(),
                program: String::new(),
                department: String::new(),
                ta_type: String::new(),
                placement: Placement::Unallocated,
            }))
            .expect("emit");

        let mut body = response.into_body().into_data_stream();
        let chunk = body
            .next()
            .await
            .expect("stream yields")
            .expect("chunk readable");
        let text = String::from_utf8(chunk.to_vec()).expect("utf8");
        assert!(text.contains("event: studentUpdated"));
    }
}
