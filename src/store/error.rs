//! Store Errors

use uuid::Uuid;

use crate::domain::TransactionStatus;

/// Errors that can occur in the ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict: zero rows matched the version guard
    #[error("Version conflict on wallet {wallet_id}")]
    VersionConflict { wallet_id: Uuid },

    /// `reference_id` uniqueness violated
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    /// Conditional status transition matched zero rows
    #[error("Transaction {transaction_id} is no longer {expected}")]
    StatusConflict {
        transaction_id: Uuid,
        expected: TransactionStatus,
    },

    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Account already exists: {0}")]
    AccountExists(Uuid),

    /// Account was not ACTIVE when a guarded unit committed
    #[error("Account frozen: {0}")]
    AccountFrozen(Uuid),

    /// The account already holds a wallet in this currency
    #[error("Account {account_id} already has a {currency} wallet")]
    WalletExists { account_id: Uuid, currency: String },

    #[error("Invalid unit of work: {0}")]
    InvalidUnit(&'static str),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Connectivity failure; the request cannot be served right now
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Database(other),
        }
    }
}
