//! Single-use nonce stores
//!
//! A nonce is live until its expiry (epoch ms). Claiming a live nonce
//! fails; an expired one may be claimed again by a new request.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;

use crate::store::StoreError;

/// Shared TTL key space with set-if-absent semantics
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Atomically claim `nonce` until `now_ms + ttl_ms`.
    ///
    /// Returns `false` when the nonce is already held by a live claim.
    async fn check_and_set(&self, nonce: &str, now_ms: i64, ttl_ms: i64)
        -> Result<bool, StoreError>;

    /// Drop expired claims, returning how many were removed
    async fn purge_expired(&self, now_ms: i64) -> Result<u64, StoreError>;
}

// =========================================================================
// In-memory
// =========================================================================

#[derive(Debug, Clone, Default)]
pub struct InMemoryNonceStore {
    nonces: Arc<DashMap<String, i64>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn check_and_set(
        &self,
        nonce: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool, StoreError> {
        let expires_at = now_ms.saturating_add(ttl_ms);
        // The entry guard holds the shard lock for the whole check-and-set
        match self.nonces.entry(nonce.to_string()) {
            Entry::Occupied(mut held) => {
                if *held.get() > now_ms {
                    return Ok(false);
                }
                held.insert(expires_at);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<u64, StoreError> {
        let before = self.nonces.len();
        self.nonces.retain(|_, expires_at| *expires_at > now_ms);
        Ok(before.saturating_sub(self.nonces.len()) as u64)
    }
}

// =========================================================================
// PostgreSQL
// =========================================================================

#[derive(Debug, Clone)]
pub struct PgNonceStore {
    pool: PgPool,
}

impl PgNonceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NonceStore for PgNonceStore {
    async fn check_and_set(
        &self,
        nonce: &str,
        now_ms: i64,
        ttl_ms: i64,
    ) -> Result<bool, StoreError> {
        // One statement: insert, or take over the row only if it has expired
        let result = sqlx::query(
            r#"
            INSERT INTO request_nonces (nonce, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (nonce) DO UPDATE
            SET expires_at = EXCLUDED.expires_at
            WHERE request_nonces.expires_at <= $3
            "#,
        )
        .bind(nonce)
        .bind(now_ms.saturating_add(ttl_ms))
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM request_nonces WHERE expires_at <= $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
