use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::maintenance::router::maintenance_router;

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

fn new_request_body() -> Value {
    json!({
        "description": "Water pooling under the bathroom sink",
        "category_id": PLUMBING,
        "property_id": PROPERTY,
        "tenant_id": TENANT,
    })
}

#[tokio::test]
async fn create_returns_created_request() {
    let (service, _, _) = build_service();
    let router = maintenance_router(Arc::new(service));

    let response = router
        .oneshot(json_request(
            Method::POST,
            "/api/v1/maintenance",
            new_request_body(),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "UNASSIGNED");
    assert_eq!(payload["handle_by_landlord"], false);
    assert_eq!(payload["landlord_id"], LANDLORD);
}

#[tokio::test]
async fn errors_map_to_status_codes_with_kind() {
    let (service, _, _) = build_service();
    let router = maintenance_router(Arc::new(service));

    let mut missing_property = new_request_body();
    missing_property["property_id"] = json!("prop-404");
    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/maintenance",
            missing_property,
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json_body(response).await["kind"], "not_found");

    let mut blank = new_request_body();
    blank["description"] = json!("");
    let response = router
        .oneshot(json_request(Method::POST, "/api/v1/maintenance", blank))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json_body(response).await["kind"], "validation");
}

#[tokio::test]
async fn direct_accept_over_http_conflicts_for_the_second_vendor() {
    let (service, _, _) = build_service();
    let request = create_request(&service);
    subscribe(&service, "vendor-a", 100);
    subscribe(&service, "vendor-b", 100);
    let router = maintenance_router(Arc::new(service));
    let uri = format!("/api/v1/maintenance/{}/accept", request.id);

    let first = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &uri,
            json!({ "vendor_id": "vendor-a" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(read_json_body(first).await["vendor_id"], "vendor-a");

    let second = router
        .oneshot(json_request(
            Method::POST,
            &uri,
            json!({ "vendor_id": "vendor-b" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let payload = read_json_body(second).await;
    assert_eq!(payload["kind"], "conflict");
    assert_eq!(payload["error"], "job already assigned");
}

#[tokio::test]
async fn complete_before_payment_is_payment_required() {
    let (service, _, _) = build_service();
    let request = assigned_request(&service, "vendor-a");
    let router = maintenance_router(Arc::new(service));

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/maintenance/{}/complete", request.id),
            json!({ "vendor_id": "vendor-a" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        read_json_body(response).await["kind"],
        "payment_not_completed"
    );

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/maintenance/{}/payment", request.id),
            json!({ "payment_status": "COMPLETED" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/maintenance/{}/complete", request.id),
            json!({ "vendor_id": "vendor-a", "attachments": ["after.jpg"] }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["status"], "COMPLETED");
}

#[tokio::test]
async fn quote_flow_over_http() {
    let (service, _, _) = build_service();
    let request = create_request(&service);
    let router = maintenance_router(Arc::new(service));
    let quotes_uri = format!("/api/v1/maintenance/{}/quotes", request.id);

    let response = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &quotes_uri,
            json!({ "vendor_id": "vendor-a", "amount": 100 }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let quote = read_json_body(response).await;
    let quote_id = quote["id"].as_str().expect("quote id").to_string();

    let duplicate = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &quotes_uri,
            json!({ "vendor_id": "vendor-a", "amount": 90 }),
        ))
        .await
        .expect("router responds");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let forbidden = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/quotes/{quote_id}/accept"),
            json!({ "landlord_id": OTHER_LANDLORD }),
        ))
        .await
        .expect("router responds");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let accepted = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &format!("/api/v1/quotes/{quote_id}/accept"),
            json!({ "landlord_id": LANDLORD }),
        ))
        .await
        .expect("router responds");
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(read_json_body(accepted).await["status"], "ACCEPTED");

    let listed = router
        .oneshot(get_request(
            "/api/v1/maintenance?vendor_id=vendor-a&status=ASSIGNED",
        ))
        .await
        .expect("router responds");
    assert_eq!(listed.status(), StatusCode::OK);
    let payload = read_json_body(listed).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));
    assert_eq!(payload[0]["amount"], 100);
}

#[tokio::test]
async fn cancellation_handshake_over_http() {
    let (service, _, _) = build_service();
    let request = assigned_request(&service, "vendor-a");
    let router = maintenance_router(Arc::new(service));
    let uri = format!("/api/v1/maintenance/{}/cancellation", request.id);

    let first = router
        .clone()
        .oneshot(json_request(
            Method::POST,
            &uri,
            json!({ "party": "tenant", "actor_id": TENANT, "reason": "resolved myself" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(first.status(), StatusCode::OK);
    let payload = read_json_body(first).await;
    assert_eq!(payload["cancelled"], false);
    assert_eq!(payload["request"]["status"], "ASSIGNED");

    let second = router
        .oneshot(json_request(
            Method::POST,
            &uri,
            json!({ "party": "vendor", "actor_id": "vendor-a" }),
        ))
        .await
        .expect("router responds");
    let payload = read_json_body(second).await;
    assert_eq!(payload["cancelled"], true);
    assert_eq!(payload["request"]["status"], "CANCEL");
    assert_eq!(payload["request"]["cancel_reason"], "resolved myself");
}

#[tokio::test]
async fn eligibility_and_history_are_readable() {
    let (service, _, _) = build_service();
    let request = assigned_request(&service, "vendor-a");
    let router = maintenance_router(Arc::new(service));

    let response = router
        .clone()
        .oneshot(get_request(&format!(
            "/api/v1/vendors/vendor-a/eligibility?category_id={PLUMBING}"
        )))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["eligible"], true);
    assert_eq!(payload["subscription"]["current_jobs"], 1);

    let response = router
        .oneshot(get_request(&format!(
            "/api/v1/maintenance/{}/history",
            request.id
        )))
        .await
        .expect("router responds");
    let payload = read_json_body(response).await;
    assert_eq!(payload["assignments"].as_array().map(Vec::len), Some(1));
    assert_eq!(payload["assignments"][0]["state"], "ASSIGNED");
}
