//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tower::util::ServiceExt;
use uuid::Uuid;

use wallet_ledger::api::middleware::{ACCOUNT_ID_HEADER, ROLE_HEADER};
use wallet_ledger::domain::CurrencyTable;
use wallet_ledger::signing::{self, InMemoryNonceStore, NonceStore, RequestVerifier, SigningKey};
use wallet_ledger::store::{InMemoryLedgerStore, LedgerStore};
use wallet_ledger::{build_router, AppState};

pub const SECRET: &[u8] = b"integration-test-secret";
pub const TTL_MS: i64 = 300_000;

/// Caller identity as the identity layer would forward it
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub account_id: Uuid,
    pub role: &'static str,
}

impl Caller {
    pub fn user(account_id: Uuid) -> Self {
        Self {
            account_id,
            role: "user",
        }
    }

    pub fn admin() -> Self {
        Self {
            account_id: Uuid::new_v4(),
            role: "admin",
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub key: SigningKey,
    pub nonces: InMemoryNonceStore,
}

/// Full router over the in-memory stores
pub fn setup_app() -> TestApp {
    setup_app_with_store(Arc::new(InMemoryLedgerStore::new()))
}

pub fn setup_app_with_store(store: Arc<dyn LedgerStore>) -> TestApp {
    let key = SigningKey::new(SECRET).unwrap();
    let nonces = InMemoryNonceStore::new();
    let nonce_store: Arc<dyn NonceStore> = Arc::new(nonces.clone());
    let verifier = RequestVerifier::new(key.clone(), TTL_MS, nonce_store);
    let currencies = CurrencyTable::parse("USD:2,EUR:2,JPY:0").unwrap();

    TestApp {
        router: build_router(AppState::new(store, verifier, currencies)),
        key,
        nonces,
    }
}

impl TestApp {
    /// Signed JSON request with a fresh nonce and the current time
    pub fn signed(&self, method: &str, path: &str, body: &Value, caller: Caller) -> Request<Body> {
        self.signed_with(
            method,
            path,
            body,
            caller,
            signing::now_ms(),
            &signing::generate_nonce(),
        )
    }

    pub fn signed_with(
        &self,
        method: &str,
        path: &str,
        body: &Value,
        caller: Caller,
        timestamp: i64,
        nonce: &str,
    ) -> Request<Body> {
        let bytes = serde_json::to_vec(body).unwrap();
        let headers = self.key.sign_request(method, path, &bytes, timestamp, nonce);

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .header(ACCOUNT_ID_HEADER, caller.account_id.to_string())
            .header(ROLE_HEADER, caller.role);
        for (name, value) in headers.to_pairs() {
            builder = builder.header(name, value);
        }
        builder.body(Body::from(bytes)).unwrap()
    }

    pub fn get(&self, path: &str, caller: Caller) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(path)
            .header(ACCOUNT_ID_HEADER, caller.account_id.to_string())
            .header(ROLE_HEADER, caller.role)
            .body(Body::empty())
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    /// Open an account with one wallet; returns (account_id, wallet_id)
    pub async fn open_account(&self, currency: &str) -> (Uuid, Uuid) {
        let (status, body) = self
            .send(self.signed(
                "POST",
                "/api/v1/admin/accounts",
                &serde_json::json!({ "currency": currency }),
                Caller::admin(),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "open account failed: {body}");

        let account_id = body["account"]["id"].as_str().unwrap().parse().unwrap();
        let wallet_id = body["wallets"][0]["id"].as_str().unwrap().parse().unwrap();
        (account_id, wallet_id)
    }
}

/// Connect to `DATABASE_URL`, apply the schema and empty every table.
///
/// Returns `None` when no database is configured so Postgres tests can skip.
/// Callers must not run concurrently against the same database.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    pool.execute(include_str!("../../migrations/0001_init.sql"))
        .await
        .expect("Failed to apply schema");

    sqlx::query(
        "TRUNCATE TABLE ledger_entries, transactions, wallets, accounts, request_nonces CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    Some(pool)
}
