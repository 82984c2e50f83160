//! Idempotency module
//!
//! Every mutating operation carries a client-chosen `referenceId`. A
//! reference that already produced a transaction is rejected outright and
//! never re-executed. The store's uniqueness constraint on `reference_id`
//! settles races between requests that both pass this check.

use std::sync::Arc;

use crate::domain::{DomainError, REVERSAL_REFERENCE_PREFIX};
use crate::error::AppError;
use crate::store::LedgerStore;

/// Longest accepted reference id
pub const MAX_REFERENCE_LEN: usize = 128;

/// Pre-flight duplicate check on reference ids
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn LedgerStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Reject malformed reference ids before touching the store
    pub fn validate_reference(reference_id: &str) -> Result<(), AppError> {
        if reference_id.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "referenceId must not be empty".to_string(),
            ));
        }
        if reference_id.len() > MAX_REFERENCE_LEN {
            return Err(AppError::InvalidRequest(format!(
                "referenceId must be at most {} bytes",
                MAX_REFERENCE_LEN
            )));
        }
        Ok(())
    }

    /// Reject reference ids a client may not claim for a new transaction
    pub fn validate_new_reference(reference_id: &str) -> Result<(), AppError> {
        Self::validate_reference(reference_id)?;
        if reference_id.starts_with(REVERSAL_REFERENCE_PREFIX) {
            return Err(AppError::InvalidRequest(format!(
                "referenceId must not start with {}",
                REVERSAL_REFERENCE_PREFIX
            )));
        }
        Ok(())
    }

    /// Fail with `DuplicateReference` when the reference is already taken
    pub async fn ensure_unused(&self, reference_id: &str) -> Result<(), AppError> {
        Self::validate_new_reference(reference_id)?;

        if let Some(existing) = self.store.find_transaction_by_reference(reference_id).await? {
            tracing::info!(
                reference_id,
                transaction_id = %existing.id,
                "Duplicate reference rejected"
            );
            return Err(DomainError::DuplicateReference(reference_id.to_string()).into());
        }
        Ok(())
    }
}
