//! Reversal Handlers
//!
//! `ReverseHandler` cancels a caller's pending authorization (status only).
//! `AdminReverseHandler` compensates a completed debit or credit with a new
//! `reverse` transaction carrying the inverse balance delta.

use std::sync::Arc;

use crate::domain::{
    reversal_reference, CurrencyTable, DomainError, OperationContext, Transaction,
    TransactionStatus, TransactionType,
};
use crate::error::AppError;
use crate::idempotency::IdempotencyGuard;
use crate::store::{BalanceMutation, LedgerStore, StatusChange, StoreError, UnitOfWork};

use super::guards::{
    self, commit, ensure_sufficient_funds, load_owned_wallet, resolve_status_conflict,
};
use super::{AdminReverseCommand, AdminReverseResult, ReverseCommand, TransactionResult};

// =========================================================================
// ReverseHandler
// =========================================================================

pub struct ReverseHandler {
    store: Arc<dyn LedgerStore>,
}

impl ReverseHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        command: ReverseCommand,
        context: &OperationContext,
    ) -> Result<TransactionResult, AppError> {
        let principal = guards::require_principal(context)?;
        IdempotencyGuard::validate_reference(&command.reference_id)?;

        let not_found = || DomainError::TransactionNotFound(command.reference_id.clone());

        let original = self
            .store
            .find_transaction_by_reference(&command.reference_id)
            .await?
            .ok_or_else(not_found)?;

        // Someone else's transaction reads as missing
        let wallet = match load_owned_wallet(&*self.store, original.wallet_id, &principal).await {
            Err(AppError::Domain(DomainError::WalletNotFound(_))) => return Err(not_found().into()),
            other => other?,
        };

        // Only pending authorizations; completed ones need an admin reversal
        match original.status {
            TransactionStatus::Pending => {}
            TransactionStatus::Completed => {
                return Err(DomainError::InvalidTransactionState {
                    transaction_id: original.id,
                    status: original.status,
                    requested: TransactionStatus::Reversed,
                }
                .into());
            }
            TransactionStatus::Reversed => {
                return Err(DomainError::AlreadyReversed(original.id).into());
            }
        }

        let unit = UnitOfWork::new().transition(StatusChange {
            transaction_id: original.id,
            from: TransactionStatus::Pending,
            to: TransactionStatus::Reversed,
        });

        let committed = match commit(&*self.store, unit, "reverse").await {
            Ok(committed) => committed,
            Err(StoreError::StatusConflict { transaction_id, .. }) => {
                return Err(resolve_status_conflict(
                    &*self.store,
                    transaction_id,
                    TransactionStatus::Reversed,
                )
                .await);
            }
            Err(err) => return Err(err.into()),
        };

        let transaction = committed
            .transitioned
            .ok_or_else(|| guards::missing("transitioned transaction"))?;

        tracing::info!(
            transaction_id = %transaction.id,
            wallet_id = %wallet.id,
            reference_id = %transaction.reference_id,
            correlation_id = ?context.correlation_id,
            "Authorization reversed"
        );

        Ok(TransactionResult {
            transaction,
            wallet: None,
            ledger_entry: None,
            settled: None,
        })
    }
}

// =========================================================================
// AdminReverseHandler
// =========================================================================

pub struct AdminReverseHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencyTable>,
}

impl AdminReverseHandler {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Arc<CurrencyTable>) -> Self {
        Self { store, currencies }
    }

    /// Frozen accounts do not block administrative reversal
    pub async fn execute(
        &self,
        command: AdminReverseCommand,
        context: &OperationContext,
    ) -> Result<AdminReverseResult, AppError> {
        let admin = guards::require_admin(context)?;

        let original = self
            .store
            .get_transaction(command.transaction_id)
            .await?
            .ok_or_else(|| DomainError::TransactionNotFound(command.transaction_id.to_string()))?;

        Self::ensure_reversible(&original)?;

        let wallet = self
            .store
            .get_wallet(original.wallet_id)
            .await?
            .ok_or(DomainError::WalletNotFound(original.wallet_id))?;

        let amount = self.currencies.positive(&wallet.currency, original.amount)?;

        // Undo a debit by crediting, a credit by debiting
        let mutation = match original.transaction_type {
            TransactionType::Debit => {
                self.currencies
                    .money(&wallet.currency, wallet.balance)?
                    .add(&amount)?;
                BalanceMutation::increment(wallet.id, amount.minor_units())
            }
            _ => {
                ensure_sufficient_funds(&self.currencies, &wallet, &amount)?;
                BalanceMutation::checked(&wallet, -amount.minor_units())
            }
        };

        let mut reversal = Transaction::new(
            wallet.id,
            TransactionType::Reverse,
            amount.minor_units(),
            TransactionStatus::Completed,
            reversal_reference(&original.reference_id),
        );
        reversal.reversal_of = Some(original.id);
        reversal.reason = command.reason.clone();

        let unit = UnitOfWork::new()
            .insert(reversal)
            .mutate(mutation)
            .transition(StatusChange {
                transaction_id: original.id,
                from: TransactionStatus::Completed,
                to: TransactionStatus::Reversed,
            });

        let committed = match commit(&*self.store, unit, "admin_reverse").await {
            Ok(committed) => committed,
            Err(StoreError::StatusConflict { transaction_id, .. }) => {
                return Err(resolve_status_conflict(
                    &*self.store,
                    transaction_id,
                    TransactionStatus::Reversed,
                )
                .await);
            }
            Err(StoreError::DuplicateReference(reference_id)) => {
                return Err(self.resolve_duplicate(&original, reference_id).await);
            }
            Err(err) => return Err(err.into()),
        };

        let original = committed
            .transitioned
            .ok_or_else(|| guards::missing("transitioned transaction"))?;
        let reversal = committed
            .transaction
            .ok_or_else(|| guards::missing("reversal transaction"))?;
        let wallet = committed.wallet.ok_or_else(|| guards::missing("wallet"))?;

        tracing::info!(
            original_id = %original.id,
            reversal_id = %reversal.id,
            wallet_id = %wallet.id,
            admin_id = %admin.account_id,
            reason = ?reversal.reason,
            balance = wallet.balance,
            correlation_id = ?context.correlation_id,
            "Administrative reversal committed"
        );

        Ok(AdminReverseResult {
            original,
            reversal,
            wallet,
        })
    }

    /// A concurrent reversal of the same original is `AlreadyReversed`;
    /// any other holder of the reference is a plain duplicate
    async fn resolve_duplicate(&self, original: &Transaction, reference_id: String) -> AppError {
        match self.store.find_transaction_by_reference(&reference_id).await {
            Ok(Some(existing)) if existing.reversal_of == Some(original.id) => {
                DomainError::AlreadyReversed(original.id).into()
            }
            Ok(_) => DomainError::DuplicateReference(reference_id).into(),
            Err(err) => err.into(),
        }
    }

    fn ensure_reversible(original: &Transaction) -> Result<(), DomainError> {
        // Authorizations never moved money and reversals are not reversible
        let reversible_type = matches!(
            original.transaction_type,
            TransactionType::Debit | TransactionType::Credit
        );
        match original.status {
            TransactionStatus::Reversed => Err(DomainError::AlreadyReversed(original.id)),
            TransactionStatus::Completed if reversible_type => Ok(()),
            status => Err(DomainError::InvalidTransactionState {
                transaction_id: original.id,
                status,
                requested: TransactionStatus::Reversed,
            }),
        }
    }
}
