//! HTTP surface: gateway webhook, donor redirects and health.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hourglass_rs::{SafeTimeProvider, TimeSource};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::errors::LedgerError;
use crate::platform::FundingPlatform;
use crate::settlement::{frontend_location, Acknowledgement, RedirectKind};

pub const SIGNATURE_HEADER: &str = "x-maya-signature";

pub type AppState = Arc<FundingPlatform>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/maya", post(maya_webhook))
        .route("/payments/success", get(payment_success))
        .route("/payments/failure", get(payment_failure))
        .route("/payments/cancel", get(payment_cancel))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

fn error_body(status: StatusCode, err: &LedgerError) -> Response {
    (status, Json(json!({ "error": err.public_message() }))).into_response()
}

async fn maya_webhook(State(platform): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let time = SafeTimeProvider::new(TimeSource::System);
    match platform.settlement().handle(&body, signature, &time) {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(LedgerError::InvalidSignature) => {
            // nothing was applied; still 200 so the gateway does not redeliver
            warn!(signed = signature.is_some(), "webhook signature rejected");
            (
                StatusCode::OK,
                Json(Acknowledgement::Ignored { reason: "unverified".to_string() }),
            )
                .into_response()
        }
        Err(e) => {
            // the payload was authentic; a non-2xx would only make the gateway redeliver
            error!(error = %e, kind = ?e.kind(), "webhook processing failed");
            (StatusCode::OK, Json(Acknowledgement::Ignored { reason: e.public_message() })).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RedirectQuery {
    id: Option<String>,
}

fn donor_redirect(platform: &FundingPlatform, kind: RedirectKind, query: RedirectQuery) -> Response {
    let Some(reference) = query.id.filter(|id| !id.trim().is_empty()) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            &LedgerError::validation("id", "payment reference is required"),
        );
    };
    match frontend_location(&platform.config().redirects, kind, reference.trim()) {
        Ok(location) => Redirect::to(&location).into_response(),
        Err(e) => {
            warn!(error = %e, "cannot build donor redirect");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}

async fn payment_success(State(platform): State<AppState>, Query(query): Query<RedirectQuery>) -> Response {
    donor_redirect(&platform, RedirectKind::Success, query)
}

async fn payment_failure(State(platform): State<AppState>, Query(query): Query<RedirectQuery>) -> Response {
    donor_redirect(&platform, RedirectKind::Failure, query)
}

async fn payment_cancel(State(platform): State<AppState>, Query(query): Query<RedirectQuery>) -> Response {
    donor_redirect(&platform, RedirectKind::Cancel, query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::CampaignDraft;
    use crate::config::LedgerConfig;
    use crate::decimal::Money;
    use crate::donation::DonorInfo;
    use crate::gateway::MockGateway;
    use crate::types::{DonationStatus, PaymentMethod};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct Fixture {
        platform: AppState,
        gateway: Arc<MockGateway>,
        reference: String,
    }

    fn fixture() -> Fixture {
        let time = SafeTimeProvider::new(TimeSource::System);
        let gateway = Arc::new(MockGateway::new("whsec"));
        let platform = Arc::new(FundingPlatform::new(LedgerConfig::sandbox("whsec"), gateway.clone()));

        let draft = CampaignDraft::general(Uuid::new_v4(), Uuid::new_v4(), "Field house", Money::from_major(5_000));
        let campaign = platform.campaigns().submit(draft, &time).unwrap();
        platform.campaigns().approve(campaign.id, Uuid::new_v4(), None, &time).unwrap();
        let donation = platform
            .donations()
            .open(campaign.id, DonorInfo::anonymous(), Money::from_major(500), PaymentMethod::Checkout, &time)
            .unwrap();

        Fixture {
            platform,
            gateway,
            reference: donation.reference,
        }
    }

    fn webhook(body: Vec<u8>, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/maya")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header("X-Maya-Signature", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let fx = fixture();
        let response = router(fx.platform)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_signed_webhook_settles() {
        let fx = fixture();
        let (body, signature) = fx.gateway.signed_notification(&fx.reference, "PAYMENT_SUCCESS").unwrap();

        let response = router(Arc::clone(&fx.platform))
            .oneshot(webhook(body.clone(), Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["result"], "settled");

        // redelivery is acknowledged without a second credit
        let response = router(Arc::clone(&fx.platform))
            .oneshot(webhook(body, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["result"], "already_settled");

        let donation = fx.platform.donations().by_reference(&fx.reference).unwrap();
        assert_eq!(donation.status(), DonationStatus::Completed);
        let summary = fx.platform.campaign_summary(donation.campaign_id).unwrap();
        assert_eq!(summary.funding.raised_amount, Money::from_major(500));
    }

    #[tokio::test]
    async fn test_unsigned_webhook_is_ignored() {
        let fx = fixture();
        let (body, _) = fx.gateway.signed_notification(&fx.reference, "PAYMENT_SUCCESS").unwrap();

        for signature in [None, Some("deadbeef")] {
            let response = router(Arc::clone(&fx.platform))
                .oneshot(webhook(body.clone(), signature))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let ack = json_body(response).await;
            assert_eq!(ack["result"], "ignored");
            assert_eq!(ack["reason"], "unverified");
        }
        let donation = fx.platform.donations().by_reference(&fx.reference).unwrap();
        assert_eq!(donation.status(), DonationStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_acknowledged() {
        let fx = fixture();
        let (body, signature) = fx.gateway.signed_notification("DON-NOT-OURS", "PAYMENT_SUCCESS").unwrap();

        let response = router(fx.platform).oneshot(webhook(body, Some(&signature))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let ack = json_body(response).await;
        assert_eq!(ack["result"], "ignored");
        assert_eq!(ack["reason"], "unknown reference");
    }

    #[tokio::test]
    async fn test_redirects_never_settle() {
        let fx = fixture();
        let uri = format!("/payments/success?id={}", fx.reference);

        let response = router(Arc::clone(&fx.platform))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(
            location,
            format!("http://localhost:5173/donations/success?reference={}", fx.reference)
        );

        let donation = fx.platform.donations().by_reference(&fx.reference).unwrap();
        assert_eq!(donation.status(), DonationStatus::Pending);

        let response = router(Arc::clone(&fx.platform))
            .oneshot(Request::builder().uri("/payments/cancel").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router(fx.platform)
            .oneshot(Request::builder().uri("/payments/failure?id=DON-X").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.ends_with("/donations/failed?reference=DON-X"));
    }
}
