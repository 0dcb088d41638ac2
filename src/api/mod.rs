use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::{
    db::EventStore,
    domain::{EventPayload, EventRecord, TrackResponse},
    errors::AppError,
};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type";

/// Largest request body accepted, matching the Cloud Functions request limit.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
}

/// Every path reaches the same handler.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", any(track_event))
        .route("/*path", any(track_event))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN))
        .layer(cors_header(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS))
        .layer(cors_header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS))
        .layer(TraceLayer::new_for_http())
}

fn cors_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

async fn track_event(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    if method == Method::OPTIONS {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body = body?;
    let payload = EventPayload::from_body(&body)?;
    let record = EventRecord::new(payload, chrono::Utc::now())?;
    state.store.insert_event(record).await?;

    Ok((StatusCode::OK, Json(TrackResponse::tracked())).into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, Response, StatusCode},
        Router,
    };
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::{
        db::{memory::MemoryEventStore, EventStore},
        domain::EventRecord,
        errors::AppError,
    };

    use super::{router, AppState, MAX_BODY_BYTES};

    struct FailingStore;

    #[async_trait]
    impl EventStore for FailingStore {
        async fn insert_event(&self, _record: EventRecord) -> Result<(), AppError> {
            Err(AppError::StoreRejected {
                status: 404,
                body: "Not found: Table acme:analytics.events".to_owned(),
            })
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl EventStore for UnreachableStore {
        async fn insert_event(&self, _record: EventRecord) -> Result<(), AppError> {
            panic!("preflight requests must not insert");
        }
    }

    fn test_app(store: impl EventStore + 'static) -> Router {
        router(AppState {
            store: Arc::new(store),
        })
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    fn assert_cors_headers<B>(response: &Response<B>) {
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
    }

    async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn preflight_returns_no_content_without_inserting() {
        let app = test_app(UnreachableStore);

        let response = app
            .oneshot(
                Request::options("/")
                    .header("origin", "https://shop.example")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_cors_headers(&response);
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn tracked_event_is_inserted_and_acknowledged() {
        let store = MemoryEventStore::default();
        let app = test_app(store.clone());
        let before = Utc::now();

        let response = app
            .oneshot(post(
                "/",
                json!({
                    "event_type": "click",
                    "user_id": "u1",
                    "session_id": "s1",
                    "url": "http://x",
                    "properties": {"a": 1}
                })
                .to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_cors_headers(&response);
        assert_eq!(
            body_bytes(response).await,
            br#"{"success":true,"message":"Event tracked successfully"}"#
        );

        let events = store.events().await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, Some(json!("click")));
        assert_eq!(event.user_id, Some(json!("u1")));
        assert_eq!(event.session_id, Some(json!("s1")));
        assert_eq!(event.url, Some(json!("http://x")));
        assert_eq!(event.properties, r#"{"a":1}"#);

        let timestamp = DateTime::parse_from_rfc3339(&event.timestamp)
            .unwrap()
            .with_timezone(&Utc);
        let after = Utc::now();
        // Millisecond truncation can put the stamp just before `before`.
        assert!(timestamp >= before - chrono::Duration::milliseconds(1));
        assert!(timestamp <= after);
    }

    #[tokio::test]
    async fn any_subset_of_fields_is_accepted() {
        let bodies = [
            json!({}),
            json!({"event_type": "view"}),
            json!({"user_id": "u2", "url": "http://y"}),
            json!({"session_id": "s9", "properties": null}),
        ];

        for body in bodies {
            let store = MemoryEventStore::default();
            let response = test_app(store.clone())
                .oneshot(post("/", body.to_string()))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let events = store.events().await;
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].properties, "{}");
        }
    }

    #[tokio::test]
    async fn empty_body_and_other_paths_still_track() {
        let store = MemoryEventStore::default();

        let response = test_app(store.clone())
            .oneshot(Request::post("/trackEvent").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let events = store.events().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].event_type.is_none());
    }

    #[tokio::test]
    async fn store_failure_yields_generic_error() {
        let app = test_app(FailingStore);

        let response = app
            .oneshot(post("/", json!({"event_type": "click"}).to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors_headers(&response);
        assert_eq!(
            body_bytes(response).await,
            br#"{"error":"Failed to track event"}"#
        );
    }

    #[tokio::test]
    async fn malformed_body_yields_generic_error_without_inserting() {
        let store = MemoryEventStore::default();

        let response = test_app(store.clone())
            .oneshot(post("/", "{\"event_type\":"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors_headers(&response);
        assert_eq!(
            body_bytes(response).await,
            br#"{"error":"Failed to track event"}"#
        );
        assert!(store.events().await.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_yields_generic_error_without_inserting() {
        let store = MemoryEventStore::default();
        let mut body = br#"{"event_type":"upload","properties":{"blob":""#.to_vec();
        body.resize(MAX_BODY_BYTES + 1, b'x');

        let response = test_app(store.clone())
            .oneshot(post("/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_cors_headers(&response);
        assert_eq!(
            body_bytes(response).await,
            br#"{"error":"Failed to track event"}"#
        );
        assert!(store.events().await.is_empty());
    }

    #[tokio::test]
    async fn body_just_under_the_limit_is_tracked() {
        let store = MemoryEventStore::default();
        let prefix = br#"{"event_type":"upload","properties":{"blob":""#;
        let suffix = br#""}}"#;
        let mut body = prefix.to_vec();
        body.resize(MAX_BODY_BYTES - suffix.len(), b'x');
        body.extend_from_slice(suffix);

        let response = test_app(store.clone())
            .oneshot(post("/", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(store.events().await.len(), 1);
    }

    #[tokio::test]
    async fn repeated_submissions_are_not_deduplicated() {
        let store = MemoryEventStore::default();
        let app = test_app(store.clone());
        let body = json!({"event_type": "purchase", "user_id": "u1"}).to_string();

        for _ in 0..3 {
            let response = app.clone().oneshot(post("/", body.clone())).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let events = store.events().await;
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|event| event.event_type == Some(json!("purchase"))));
    }

    #[tokio::test]
    async fn get_requests_are_handled_like_posts() {
        let store = MemoryEventStore::default();

        let response = test_app(store.clone())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_cors_headers(&response);
        assert_eq!(store.events().await.len(), 1);
    }
}
