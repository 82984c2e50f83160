//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;
use uuid::Uuid;

use super::money::MoneyError;
use super::model::TransactionStatus;

/// Ledger-level errors.
///
/// These represent business rule violations and invariant failures raised
/// by the transaction engine. The HTTP layer maps every variant to a
/// stable (code, status) pair.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Wallet missing or not owned by the caller
    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    /// Transaction missing or not owned by the caller
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// Non-positive, non-integral or out-of-range amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("Account is frozen: {0}")]
    AccountFrozen(Uuid),

    /// A transaction with this reference id already exists
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    /// Another writer committed against the wallet first
    #[error("Concurrent modification of wallet {wallet_id}")]
    ConcurrentModification { wallet_id: Uuid },

    #[error("Invalid transaction state: {transaction_id} is {status}, cannot become {requested}")]
    InvalidTransactionState {
        transaction_id: Uuid,
        status: TransactionStatus,
        requested: TransactionStatus,
    },

    #[error("Transaction already reversed: {0}")]
    AlreadyReversed(Uuid),
}

impl DomainError {
    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }
}

impl From<MoneyError> for DomainError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::CurrencyMismatch { left, right } => Self::CurrencyMismatch { left, right },
            other => Self::InvalidAmount(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_error() {
        let err = DomainError::insufficient_funds(100, 50);

        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_money_error_conversion() {
        let err: DomainError = MoneyError::NotPositive(0).into();
        assert!(matches!(err, DomainError::InvalidAmount(_)));

        let err: DomainError = MoneyError::CurrencyMismatch {
            left: "USD".into(),
            right: "EUR".into(),
        }
        .into();
        assert!(matches!(err, DomainError::CurrencyMismatch { .. }));
    }
}
