//! API Integration Tests
//!
//! Drive the full router (signature, principal and role middleware) over
//! the in-memory stores.

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use wallet_ledger::signing;

mod common;

use common::{setup_app, Caller, TestApp, TTL_MS};

async fn credit(app: &TestApp, caller: Caller, wallet_id: Uuid, amount: i64, reference: &str) {
    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/credit",
            &json!({ "walletId": wallet_id, "amount": amount, "referenceId": reference }),
            caller,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "credit failed: {body}");
}

#[tokio::test]
async fn test_debit_and_admin_reversal_e2e() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;
    let owner = Caller::user(account_id);

    credit(&app, owner, wallet_id, 10_000, "seed").await;

    // 1. Debit the whole balance
    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/debit",
            &json!({ "walletId": wallet_id, "amount": 10_000, "referenceId": "r1" }),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "debit failed: {body}");
    assert_eq!(body["wallet"]["balance"], 0);
    assert_eq!(body["ledgerEntry"]["direction"], "debit");
    assert_eq!(body["ledgerEntry"]["amount"], 10_000);
    assert_eq!(body["ledgerEntry"]["balanceBefore"], 10_000);
    assert_eq!(body["ledgerEntry"]["balanceAfter"], 0);
    let debit_id = body["transaction"]["id"].as_str().unwrap().to_string();

    // 2. One more minor unit is too much
    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/debit",
            &json!({ "walletId": wallet_id, "amount": 1, "referenceId": "r2" }),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "insufficient_funds");

    // 3. Admin compensates the debit
    let (status, body) = app
        .send(app.signed(
            "POST",
            &format!("/api/v1/admin/transactions/{}/reverse", debit_id),
            &json!({ "reason": "chargeback" }),
            Caller::admin(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "admin reverse failed: {body}");
    assert_eq!(body["original"]["status"], "reversed");
    assert_eq!(body["reversal"]["type"], "reverse");
    assert_eq!(body["reversal"]["referenceId"], "REV-r1");
    assert_eq!(body["reversal"]["reversalOf"], debit_id.as_str());
    assert_eq!(body["wallet"]["balance"], 10_000);

    // 4. Ledger replays to the stored balance
    let (status, body) = app
        .send(app.get(
            &format!("/api/v1/admin/wallets/{}/verify", wallet_id),
            Caller::admin(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consistent"], true);
    assert_eq!(body["entryCount"], 3);

    let (status, body) = app
        .send(app.get(&format!("/api/v1/wallets/{}/ledger", wallet_id), owner))
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2]["direction"], "credit");
}

#[tokio::test]
async fn test_duplicate_reference_is_conflict() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;
    let owner = Caller::user(account_id);
    credit(&app, owner, wallet_id, 500, "seed").await;

    let body = json!({ "walletId": wallet_id, "amount": 100, "referenceId": "dup-1" });
    let (status, _) = app
        .send(app.signed("POST", "/api/v1/transactions/debit", &body, owner))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Fresh nonce, same reference
    let (status, response) = app
        .send(app.signed("POST", "/api/v1/transactions/debit", &body, owner))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["error_code"], "duplicate_reference");

    let (_, wallet) = app
        .send(app.get(&format!("/api/v1/wallets/{}", wallet_id), owner))
        .await;
    assert_eq!(wallet["balance"], 400);
}

#[tokio::test]
async fn test_authorize_then_reverse() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("EUR").await;
    let owner = Caller::user(account_id);
    credit(&app, owner, wallet_id, 2_500, "seed").await;

    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/authorize",
            &json!({ "walletId": wallet_id, "amount": 2_000, "referenceId": "auth-1" }),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["type"], "authorize");

    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/reverse",
            &json!({ "referenceId": "auth-1" }),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reversed");

    // Reversing again hits the terminal state
    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/reverse",
            &json!({ "referenceId": "auth-1" }),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "already_reversed");

    let (_, wallet) = app
        .send(app.get(&format!("/api/v1/wallets/{}", wallet_id), owner))
        .await;
    assert_eq!(wallet["balance"], 2_500);
    assert_eq!(wallet["version"], 1);
}

#[tokio::test]
async fn test_non_integral_amount_rejected() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;

    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/credit",
            &json!({ "walletId": wallet_id, "amount": 10.5, "referenceId": "frac" }),
            Caller::user(account_id),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");
}

#[tokio::test]
async fn test_malformed_body_uses_error_format() {
    let app = setup_app();
    let (account_id, _) = app.open_account("USD").await;
    let owner = Caller::user(account_id);

    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/debit",
            &json!({ "walletId": "not-a-uuid", "amount": 100, "referenceId": "bad-1" }),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
    assert!(!body["error"].as_str().unwrap().contains("UUID"));

    let (status, body) = app
        .send(app.get("/api/v1/wallets/not-a-uuid", owner))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_reversal_reference_prefix_is_reserved() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;

    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/authorize",
            &json!({ "walletId": wallet_id, "amount": 1, "referenceId": "REV-seed" }),
            Caller::user(account_id),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}

// =========================================================================
// Request integrity
// =========================================================================

#[tokio::test]
async fn test_missing_signature_headers() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;

    let mut request = app.signed(
        "POST",
        "/api/v1/transactions/credit",
        &json!({ "walletId": wallet_id, "amount": 1, "referenceId": "unsigned" }),
        Caller::user(account_id),
    );
    request.headers_mut().remove(signing::SIGNATURE_HEADER);

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "missing_signature_headers");
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;
    let owner = Caller::user(account_id);

    let signed = app.signed(
        "POST",
        "/api/v1/transactions/credit",
        &json!({ "walletId": wallet_id, "amount": 1, "referenceId": "t-1" }),
        owner,
    );
    let (parts, _) = signed.into_parts();
    let tampered = serde_json::to_vec(
        &json!({ "walletId": wallet_id, "amount": 1_000_000, "referenceId": "t-1" }),
    )
    .unwrap();
    let request = axum::http::Request::from_parts(parts, axum::body::Body::from(tampered));

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "invalid_signature");
}

#[tokio::test]
async fn test_expired_timestamp_is_rejected() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;

    let request = app.signed_with(
        "POST",
        "/api/v1/transactions/credit",
        &json!({ "walletId": wallet_id, "amount": 1, "referenceId": "old" }),
        Caller::user(account_id),
        signing::now_ms() - TTL_MS - 60_000,
        &signing::generate_nonce(),
    );

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "request_expired");
}

#[tokio::test]
async fn test_replayed_nonce_is_rejected() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;
    let owner = Caller::user(account_id);
    let timestamp = signing::now_ms();
    let nonce = signing::generate_nonce();
    let body = json!({ "walletId": wallet_id, "amount": 1, "referenceId": "once" });

    let first = app.signed_with("POST", "/api/v1/transactions/credit", &body, owner, timestamp, &nonce);
    let replay = app.signed_with("POST", "/api/v1/transactions/credit", &body, owner, timestamp, &nonce);

    let (status, _) = app.send(first).await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = app.send(replay).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["error_code"], "replay_detected");
}

#[tokio::test]
async fn test_unsupported_signature_version() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;

    let mut request = app.signed(
        "POST",
        "/api/v1/transactions/credit",
        &json!({ "walletId": wallet_id, "amount": 1, "referenceId": "v2" }),
        Caller::user(account_id),
    );
    request
        .headers_mut()
        .insert(signing::SIGNATURE_VERSION_HEADER, "v2".parse().unwrap());

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "unsupported_signature_version");
}

// =========================================================================
// Identity and roles
// =========================================================================

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = setup_app();
    let (account_id, _) = app.open_account("USD").await;

    let (status, body) = app
        .send(app.signed(
            "POST",
            &format!("/api/v1/admin/accounts/{}/freeze", account_id),
            &json!({}),
            Caller::user(account_id),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "forbidden");
}

#[tokio::test]
async fn test_missing_principal_is_unauthorized() {
    let app = setup_app();

    let request = axum::http::Request::builder()
        .method("GET")
        .uri(format!("/api/v1/wallets/{}", Uuid::new_v4()))
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "unauthorized");
}

#[tokio::test]
async fn test_frozen_account_rejects_debit() {
    let app = setup_app();
    let (account_id, wallet_id) = app.open_account("USD").await;
    let owner = Caller::user(account_id);
    credit(&app, owner, wallet_id, 100, "seed").await;

    let (status, body) = app
        .send(app.signed(
            "POST",
            &format!("/api/v1/admin/accounts/{}/freeze", account_id),
            &json!({}),
            Caller::admin(),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FROZEN");

    let (status, body) = app
        .send(app.signed(
            "POST",
            "/api/v1/transactions/debit",
            &json!({ "walletId": wallet_id, "amount": 10, "referenceId": "frozen" }),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "account_frozen");
}

#[tokio::test]
async fn test_foreign_wallet_reads_as_not_found() {
    let app = setup_app();
    let (_, wallet_id) = app.open_account("USD").await;

    let (status, body) = app
        .send(app.get(
            &format!("/api/v1/wallets/{}", wallet_id),
            Caller::user(Uuid::new_v4()),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "not_found");
}

#[tokio::test]
async fn test_health_check() {
    let app = setup_app();

    let request = axum::http::Request::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();

    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}
