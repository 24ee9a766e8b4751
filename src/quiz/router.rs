use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use super::answer::AnswerMap;
use super::gateway::{SubmissionError, SubmissionGateway};
use super::mailer::Mailer;

/// Header carrying the originating client address behind a proxy.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Router exposing the lead submission endpoint.
pub fn lead_router<M: Mailer + 'static>(gateway: Arc<SubmissionGateway<M>>) -> Router {
    Router::new()
        .route("/api/send-lead", post(send_lead_handler::<M>))
        .with_state(gateway)
}

/// Rate-limit key for a request. Clients behind a proxy that strips the
/// forwarding header all share the `unknown` bucket; known limitation.
fn client_key(headers: &HeaderMap) -> String {
    headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

async fn send_lead_handler<M: Mailer + 'static>(
    State(gateway): State<Arc<SubmissionGateway<M>>>,
    headers: HeaderMap,
    Json(answers): Json<AnswerMap>,
) -> Result<Json<Value>, SubmissionError> {
    let key = client_key(&headers);
    gateway.submit(&key, &answers).await?;

    info!(client = %key, "lead accepted");
    Ok(Json(json!({
        "success": true,
        "message": "Votre demande a été envoyée avec succès !",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::catalog::Catalog;
    use crate::quiz::mailer::MemoryMailer;
    use crate::quiz::rate_limit::SlidingWindowLimiter;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_router(mailer: Arc<MemoryMailer>, max_requests: u32) -> Router {
        let gateway = SubmissionGateway::new(
            Arc::new(Catalog::standard()),
            mailer,
            SlidingWindowLimiter::new(Duration::from_secs(60), max_requests, 100),
            "contact@agency.test",
            "CF Evolution",
        );
        lead_router(Arc::new(gateway))
    }

    fn lead_request(body: &str, forwarded_for: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/send-lead")
            .header("content-type", "application/json");
        if let Some(client) = forwarded_for {
            builder = builder.header("x-forwarded-for", client);
        }
        builder.body(Body::from(body.to_string())).expect("request builds")
    }

    const COMPLETE_BODY: &str = r#"{
        "service": "website",
        "contact": { "firstName": "Jo", "lastName": "Durand", "email": "jo@x.com" }
    }"#;

    #[tokio::test]
    async fn complete_submission_returns_success_payload() {
        let mailer = Arc::new(MemoryMailer::new());
        let app = test_router(mailer.clone(), 3);

        let response = app
            .oneshot(lead_request(COMPLETE_BODY, Some("10.0.0.1")))
            .await
            .expect("handler responds");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let payload: Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(payload["success"], json!(true));
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn incomplete_contact_yields_bad_request() {
        let app = test_router(Arc::new(MemoryMailer::new()), 3);
        let body = r#"{ "contact": { "firstName": "Jo", "email": "jo@x.com" } }"#;

        let response = app
            .oneshot(lead_request(body, Some("10.0.0.1")))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_email_yields_bad_request() {
        let app = test_router(Arc::new(MemoryMailer::new()), 3);
        let body = r#"{
            "contact": { "firstName": "Jo", "lastName": "Durand", "email": "not-an-email" }
        }"#;

        let response = app
            .oneshot(lead_request(body, Some("10.0.0.1")))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rate_limited_client_gets_429() {
        let app = test_router(Arc::new(MemoryMailer::new()), 1);

        let first = app
            .clone()
            .oneshot(lead_request(COMPLETE_BODY, Some("10.0.0.9")))
            .await
            .expect("handler responds");
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(lead_request(COMPLETE_BODY, Some("10.0.0.9")))
            .await
            .expect("handler responds");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn dispatch_failure_yields_internal_error() {
        let app = test_router(Arc::new(MemoryMailer::failing()), 3);

        let response = app
            .oneshot(lead_request(COMPLETE_BODY, Some("10.0.0.1")))
            .await
            .expect("handler responds");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn missing_forwarding_header_falls_into_the_shared_bucket() {
        let app = test_router(Arc::new(MemoryMailer::new()), 1);

        let first = app
            .clone()
            .oneshot(lead_request(COMPLETE_BODY, None))
            .await
            .expect("handler responds");
        assert_eq!(first.status(), StatusCode::OK);

        // A different header-less client shares the "unknown" key.
        let second = app
            .oneshot(lead_request(COMPLETE_BODY, None))
            .await
            .expect("handler responds");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
