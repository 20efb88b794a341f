use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::verification::domain::{DocumentType, VerificationMethod};
use crate::workflows::verification::repository::VerificationRepository;
use crate::workflows::verification::router::{parse_schedule, USER_ID_HEADER, USER_ROLE_HEADER};

fn json_request(method: &str, uri: &str, user: &str, role: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(USER_ID_HEADER, user)
        .header(USER_ROLE_HEADER, role)
        .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
        .expect("request builds")
}

fn upload_body(file_name: &str) -> Value {
    json!({
        "file_name": file_name,
        "content_type": "application/pdf",
        "content_base64": base64::engine::general_purpose::STANDARD.encode(b"%PDF-1.4 body"),
    })
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let router = Harness::new().into_router();

    let response = router
        .oneshot(
            Request::post("/api/v1/educators")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_route_creates_pending_profile() {
    let router = Harness::new().into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/educators",
            "user-1",
            "educator",
            serde_json::to_value(registration(VerificationMethod::Standard))
                .expect("registration serializes"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "pending_documents");
    assert_eq!(payload["verification_badge"], false);
    assert_eq!(payload["missing_documents"].as_array().map(Vec::len), Some(4));
}

#[tokio::test]
async fn upload_route_rejects_unknown_document_type() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    let router = harness.into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/educators/{}/documents/passport", profile.id),
            "user-1",
            "educator",
            upload_body("passport.pdf"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn upload_route_stores_document() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    let router = harness.into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/educators/{}/documents/id_card", profile.id),
            "user-1",
            "educator",
            upload_body("cni.pdf"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["document_type"], "id_card");
    assert_eq!(payload["status"], "pending");
}

#[tokio::test]
async fn admin_routes_are_forbidden_for_educators() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    let documents = harness.upload_all("user-1", &profile.id);
    let router = harness.into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            &format!(
                "/api/v1/admin/documents/{}/approve",
                documents[&DocumentType::IdCard]
            ),
            "user-1",
            "educator",
            json!({}),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reject_route_requires_reason() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    let documents = harness.upload_all("user-1", &profile.id);
    let router = harness.into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            &format!(
                "/api/v1/admin/documents/{}/reject",
                documents[&DocumentType::CriminalRecord]
            ),
            ADMIN_ID,
            "admin",
            json!({ "reason": "" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn criminal_record_rejection_route_reports_revoked_visibility() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    let documents = harness.upload_all("user-1", &profile.id);
    let router = harness.into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            &format!(
                "/api/v1/admin/documents/{}/reject",
                documents[&DocumentType::CriminalRecord]
            ),
            ADMIN_ID,
            "admin",
            json!({ "reason": "Casier non vierge" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "rejected_criminal_record");
    assert_eq!(payload["verification_badge"], false);
    assert_eq!(payload["profile_visible"], false);
    assert_eq!(payload["document"]["rejection_reason"], "Casier non vierge");
}

#[tokio::test]
async fn interview_route_validates_date_and_state() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    harness.upload_all("user-1", &profile.id);
    let router = harness.into_router();
    let uri = format!("/api/v1/admin/educators/{}/interview", profile.id);

    let missing = router
        .clone()
        .oneshot(json_request("POST", &uri, ADMIN_ID, "admin", json!({})))
        .await
        .expect("route executes");
    assert_eq!(missing.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let malformed = router
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            ADMIN_ID,
            "admin",
            json!({ "date": "next tuesday" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(malformed.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let premature = router
        .oneshot(json_request(
            "POST",
            &uri,
            ADMIN_ID,
            "admin",
            json!({ "date": "2025-03-01T10:00" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(premature.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_educator_is_not_found() {
    let router = Harness::new().into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/admin/educators/edu-missing/approve",
            ADMIN_ID,
            "admin",
            json!({}),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn own_overview_route_resolves_the_calling_educator() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    harness.upload_all("user-1", &profile.id);
    let router = harness.into_router();

    let response = router
        .clone()
        .oneshot(json_request("GET", "/api/v1/educators/me", "user-1", "educator", json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["educator_id"], json!(profile.id));
    assert_eq!(payload["status"], "documents_submitted");

    let response = router
        .clone()
        .oneshot(json_request("GET", "/api/v1/educators/me", "user-2", "educator", json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(json_request("GET", "/api/v1/educators/me", ADMIN_ID, "admin", json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn failed_recompute_returns_retry_hint_and_recompute_route_recovers() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    let documents = harness.upload_all("user-1", &profile.id);
    let session = harness.review.authorize(&admin()).expect("admin session");
    for kind in [
        DocumentType::Diploma,
        DocumentType::CriminalRecord,
        DocumentType::IdCard,
    ] {
        session
            .approve_document(&documents[&kind])
            .expect("approve succeeds");
    }
    let repository = harness.repository.clone();
    let router = harness.into_router();

    let insurance = &documents[&DocumentType::Insurance];
    repository.fail_next(RepositoryCall::UpdateEducator);
    let response = router
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/admin/documents/{insurance}/approve"),
            ADMIN_ID,
            "admin",
            json!({}),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["retry"], "recompute");
    assert_eq!(payload["document_id"], json!(insurance));

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/admin/educators/{}/recompute", profile.id),
            ADMIN_ID,
            "admin",
            json!({}),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "documents_verified");
}

#[tokio::test]
async fn decision_on_a_superseded_upload_is_a_conflict() {
    let harness = Harness::new();
    let profile = harness.register("user-1", VerificationMethod::Standard);
    let documents = harness.upload_all("user-1", &profile.id);
    let id_card = &documents[&DocumentType::IdCard];
    let mut reviewed = harness
        .repository
        .fetch_document(id_card)
        .expect("fetch succeeds")
        .expect("document present");
    reviewed.uploaded_at -= chrono::Duration::seconds(1);
    harness
        .educators
        .upload_document(
            &educator("user-1"),
            &profile.id,
            DocumentType::IdCard,
            pdf("carte-identite-v2.pdf"),
        )
        .expect("re-upload succeeds");
    harness.repository.serve_stale(reviewed);
    let router = harness.into_router();

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/admin/documents/{id_card}/approve"),
            ADMIN_ID,
            "admin",
            json!({}),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn capacity_route_reports_gate_decisions() {
    let router = Harness::new().into_router();

    let response = router
        .oneshot(
            Request::get("/api/v1/educators/edu-1/capacity?active_conversations=3&active_bookings=0")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["conversation"]["decision"], "limit_reached");
    assert_eq!(payload["booking"]["decision"], "allowed");
}

#[test]
fn parse_schedule_accepts_rfc3339_and_local_form() {
    let local = parse_schedule("2025-03-01T10:00").expect("local form parses");
    let rfc = parse_schedule("2025-03-01T10:00:00Z").expect("rfc3339 parses");
    assert_eq!(local, rfc);

    let offset = parse_schedule("2025-03-01T11:00:00+01:00").expect("offset parses");
    assert_eq!(offset, rfc);

    assert!(parse_schedule("01/03/2025").is_err());
}
