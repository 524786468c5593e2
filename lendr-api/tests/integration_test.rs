use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use lendr_api::{app, AppState, AuthConfig};
use lendr_store::InMemoryLendingRepository;
use serde_json::{json, Value};
use tower::ServiceExt;

const KEY: &str = "test-key";

fn test_app() -> Router {
    let state = AppState::new(
        Arc::new(InMemoryLendingRepository::new()),
        AuthConfig::new([KEY]),
    );
    app(state)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .uri(uri)
        .header("X-API-Key", KEY)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("X-API-Key", KEY)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

async fn seed_customer(app: &Router, id: &str, score: &str) {
    let (status, _) = post(app, "/customers", json!({ "external_id": id, "score": score })).await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn seed_loan(app: &Router, id: &str, customer: &str, amount: &str) {
    let (status, _) = post(
        app,
        "/loans",
        json!({ "external_id": id, "customer_external_id": customer, "amount": amount }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_requests_without_key_are_forbidden() {
    let app = test_app();
    let req = Request::builder().uri("/customers").body(Body::empty()).unwrap();

    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Authentication credentials were not provided.");
}

#[tokio::test]
async fn test_unknown_key_is_forbidden() {
    let app = test_app();
    let req = Request::builder()
        .uri("/customers")
        .header("X-API-Key", "nope")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["detail"], "Invalid API key.");
}

#[tokio::test]
async fn test_authorization_header_is_accepted() {
    let app = test_app();
    let req = Request::builder()
        .uri("/customers")
        .header(header::AUTHORIZATION, format!("Api-Key {KEY}"))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_blank_key_header_uses_authorization() {
    let app = test_app();
    let req = Request::builder()
        .uri("/customers")
        .header("X-API-Key", "")
        .header(header::AUTHORIZATION, format!("Api-Key {KEY}"))
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let app = test_app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// ============================================================================
// Customers
// ============================================================================

#[tokio::test]
async fn test_create_and_fetch_customer() {
    let app = test_app();

    let (status, body) =
        post(&app, "/customers", json!({ "external_id": "cust_1", "score": 2500 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["external_id"], "cust_1");
    assert_eq!(body["status"], "ACTIVE");
    assert_eq!(body["score"], "2500.00");

    let (status, body) = get(&app, "/customers/cust_1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["external_id"], "cust_1");

    let (status, body) = get(&app, "/customers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_customer_is_rejected() {
    let app = test_app();
    seed_customer(&app, "cust_1", "1000").await;

    let (status, body) =
        post(&app, "/customers", json!({ "external_id": "cust_1", "score": "5" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["external_id"][0],
        "customer with this external_id already exists."
    );
}

#[tokio::test]
async fn test_missing_customer_is_not_found() {
    let app = test_app();

    let (status, body) = get(&app, "/customers/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Not found.");

    let (status, _) = get(&app, "/customers/ghost/balance").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = test_app();

    let (status, body) = post(&app, "/customers", json!({ "external_id": "x" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_balance_tracks_open_loans() {
    let app = test_app();
    seed_customer(&app, "cust_1", "1000").await;
    seed_loan(&app, "loan_1", "cust_1", "300").await;
    seed_loan(&app, "loan_2", "cust_1", "200").await;

    let (status, body) = get(&app, "/customers/cust_1/balance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_debt"], "500.00");
    assert_eq!(body["available_amount"], "500.00");

    let req = Request::builder()
        .method(Method::POST)
        .uri("/loans/loan_2/reject")
        .header("X-API-Key", KEY)
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = get(&app, "/customers/cust_1/balance").await;
    assert_eq!(body["total_debt"], "300.00");
    assert_eq!(body["available_amount"], "700.00");
}

#[tokio::test]
async fn test_upload_imports_customers() {
    let app = test_app();
    let boundary = "lendrboundary";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"customers.csv\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         bulk_1,1000.00\n\
         bulk_2,2000.00,2025-04-19T15:00:00Z\n\
         broken\r\n\
         --{boundary}--\r\n"
    );
    let req = Request::builder()
        .method(Method::POST)
        .uri("/customers/upload")
        .header("X-API-Key", KEY)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(payload))
        .unwrap();

    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(["bulk_1", "bulk_2"]));
    assert_eq!(body["errors"], json!(["Line 3: expected 2 or 3 values, got 1"]));

    let (_, body) = get(&app, "/customers/bulk_2").await;
    assert_eq!(body["preapproved_at"], "2025-04-19T15:00:00Z");
}

#[tokio::test]
async fn test_upload_without_file_field() {
    let app = test_app();
    let boundary = "lendrboundary";
    let payload = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"other\"\r\n\r\n\
         nothing\r\n\
         --{boundary}--\r\n"
    );
    let req = Request::builder()
        .method(Method::POST)
        .uri("/customers/upload")
        .header("X-API-Key", KEY)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(payload))
        .unwrap();

    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["file"][0], "No file was submitted.");
}

#[tokio::test]
async fn test_upload_rejects_non_multipart_body_as_json() {
    let app = test_app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/customers/upload")
        .header("X-API-Key", KEY)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("bulk_1,1000.00\n"))
        .unwrap();

    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["file"][0].is_string());
}

// ============================================================================
// Loans
// ============================================================================

#[tokio::test]
async fn test_loan_within_credit_line_is_pending() {
    let app = test_app();
    seed_customer(&app, "cust_1", "1000").await;

    let (status, body) = post(
        &app,
        "/loans",
        json!({ "external_id": "loan_1", "customer_external_id": "cust_1", "amount": "1000" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["amount"], "1000.00");
    assert_eq!(body["outstanding"], "1000.00");
    assert_eq!(body["customer_external_id"], "cust_1");
}

#[tokio::test]
async fn test_loan_over_credit_line_is_refused() {
    let app = test_app();
    seed_customer(&app, "cust_1", "1000").await;
    seed_loan(&app, "loan_1", "cust_1", "800").await;

    let (status, body) = post(
        &app,
        "/loans",
        json!({ "external_id": "loan_2", "customer_external_id": "cust_1", "amount": "200.01" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["amount"][0],
        "This loan would exceed the customer's available credit line."
    );

    let (status, _) = get(&app, "/loans/loan_2").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_loan_for_unknown_customer() {
    let app = test_app();

    let (status, body) = post(
        &app,
        "/loans",
        json!({ "external_id": "loan_1", "customer_external_id": "ghost", "amount": "10" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["customer_external_id"][0],
        "Customer with that external_id does not exist."
    );
}

#[tokio::test]
async fn test_list_loans_filters_by_customer() {
    let app = test_app();
    seed_customer(&app, "cust_1", "1000").await;
    seed_customer(&app, "cust_2", "1000").await;
    seed_loan(&app, "loan_1", "cust_1", "100").await;
    seed_loan(&app, "loan_2", "cust_2", "100").await;

    let (status, body) = get(&app, "/loans").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = get(&app, "/loans?customer_external_id=cust_2").await;
    let loans = body.as_array().unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0]["external_id"], "loan_2");
}

#[tokio::test]
async fn test_activate_then_reject_is_refused() {
    let app = test_app();
    seed_customer(&app, "cust_1", "1000").await;
    seed_loan(&app, "loan_1", "cust_1", "100").await;

    let (status, body) = post(&app, "/loans/loan_1/activate", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ACTIVE");
    assert!(body["taken_at"].is_string());

    let (status, body) = post(&app, "/loans/loan_1/reject", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Only loans in 'pending' may be rejected.");

    let (status, body) = post(&app, "/loans/loan_1/activate", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Only loans in 'pending' may be activated.");

    let (status, _) = post(&app, "/loans/ghost/activate", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Payments
// ============================================================================

#[tokio::test]
async fn test_payment_is_allocated_oldest_first() {
    let app = test_app();
    seed_customer(&app, "cust_1", "5000").await;
    seed_loan(&app, "loan_1", "cust_1", "600").await;
    seed_loan(&app, "loan_2", "cust_1", "400").await;

    let (status, body) = post(
        &app,
        "/payments",
        json!({ "external_id": "pay_1", "customer_external_id": "cust_1", "total_amount": "700" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "COMPLETED");
    assert!(body["paid_at"].is_string());
    assert_eq!(
        body["payment_details"],
        json!([
            { "loan_external_id": "loan_1", "amount": "600.00" },
            { "loan_external_id": "loan_2", "amount": "100.00" },
        ])
    );

    let (_, loan) = get(&app, "/loans/loan_1").await;
    assert_eq!(loan["status"], "PAID");
    assert_eq!(loan["outstanding"], "0.00");

    let (_, loan) = get(&app, "/loans/loan_2").await;
    assert_eq!(loan["status"], "ACTIVE");
    assert_eq!(loan["outstanding"], "300.00");

    let (_, balance) = get(&app, "/customers/cust_1/balance").await;
    assert_eq!(balance["total_debt"], "300.00");
}

#[tokio::test]
async fn test_payment_over_debt_is_recorded_as_rejected() {
    let app = test_app();
    seed_customer(&app, "cust_1", "5000").await;
    seed_loan(&app, "loan_1", "cust_1", "1000").await;

    let (status, body) = post(
        &app,
        "/payments",
        json!({ "external_id": "pay_1", "customer_external_id": "cust_1", "total_amount": "1200" }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "REJECTED");
    assert_eq!(body["paid_at"], Value::Null);
    assert_eq!(body["payment_details"], json!([]));

    let (_, loan) = get(&app, "/loans/loan_1").await;
    assert_eq!(loan["outstanding"], "1000.00");
    assert_eq!(loan["status"], "PENDING");
}

#[tokio::test]
async fn test_list_and_fetch_payments() {
    let app = test_app();
    seed_customer(&app, "cust_1", "5000").await;
    seed_customer(&app, "cust_2", "5000").await;
    seed_loan(&app, "loan_1", "cust_1", "1000").await;
    seed_loan(&app, "loan_2", "cust_2", "1000").await;

    for (id, cust) in [("pay_1", "cust_1"), ("pay_2", "cust_2")] {
        let (status, _) = post(
            &app,
            "/payments",
            json!({ "external_id": id, "customer_external_id": cust, "total_amount": "10" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, body) = get(&app, "/payments").await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = get(&app, "/payments?customer_external_id=cust_1").await;
    let payments = body.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["external_id"], "pay_1");

    let (status, body) = get(&app, "/payments/pay_2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_amount"], "10.00");
    assert_eq!(body["payment_details"][0]["loan_external_id"], "loan_2");

    let (status, _) = get(&app, "/payments/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
