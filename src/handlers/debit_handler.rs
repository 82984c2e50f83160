//! Debit Handler
//!
//! Version-checked withdrawal. A debit may also settle a pending
//! authorization on the same wallet, moving it to `completed` in the same
//! unit of work.

use std::sync::Arc;

use crate::domain::{
    CurrencyTable, DomainError, OperationContext, Transaction, TransactionStatus,
    TransactionType, Wallet,
};
use crate::error::AppError;
use crate::idempotency::IdempotencyGuard;
use crate::store::{BalanceMutation, LedgerStore, StatusChange, StoreError, UnitOfWork};

use super::guards::{
    self, commit, ensure_sufficient_funds, load_account, load_owned_wallet,
    resolve_status_conflict,
};
use super::{TransactionResult, WalletOperationCommand};

pub struct DebitHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencyTable>,
    idempotency: IdempotencyGuard,
}

impl DebitHandler {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Arc<CurrencyTable>) -> Self {
        Self {
            idempotency: IdempotencyGuard::new(store.clone()),
            store,
            currencies,
        }
    }

    pub async fn execute(
        &self,
        command: WalletOperationCommand,
        context: &OperationContext,
    ) -> Result<TransactionResult, AppError> {
        let principal = guards::require_principal(context)?;
        self.idempotency.ensure_unused(&command.reference_id).await?;

        let wallet = load_owned_wallet(&*self.store, command.wallet_id, &principal).await?;
        load_account(&*self.store, wallet.account_id)
            .await?
            .ensure_active()?;

        let amount = self.currencies.positive(&wallet.currency, command.amount)?;

        let authorization = match &command.authorization_reference {
            Some(reference) => Some(self.load_authorization(reference, &wallet, command.amount).await?),
            None => None,
        };

        // Checked against the snapshot; the version guard catches staleness
        ensure_sufficient_funds(&self.currencies, &wallet, &amount)?;

        let transaction = Transaction::new(
            wallet.id,
            TransactionType::Debit,
            amount.minor_units(),
            TransactionStatus::Completed,
            command.reference_id,
        );

        let mut unit = UnitOfWork::new()
            .insert(transaction)
            .mutate(BalanceMutation::checked(&wallet, -amount.minor_units()))
            .require_active(wallet.account_id);
        if let Some(auth) = &authorization {
            unit = unit.transition(StatusChange {
                transaction_id: auth.id,
                from: TransactionStatus::Pending,
                to: TransactionStatus::Completed,
            });
        }

        let committed = match commit(&*self.store, unit, "debit").await {
            Ok(committed) => committed,
            Err(StoreError::StatusConflict { transaction_id, .. }) => {
                return Err(resolve_status_conflict(
                    &*self.store,
                    transaction_id,
                    TransactionStatus::Completed,
                )
                .await);
            }
            Err(err) => return Err(err.into()),
        };

        let transaction = committed
            .transaction
            .ok_or_else(|| guards::missing("transaction"))?;
        let updated = committed.wallet.ok_or_else(|| guards::missing("wallet"))?;

        tracing::info!(
            transaction_id = %transaction.id,
            wallet_id = %updated.id,
            amount = %amount,
            balance = updated.balance,
            version = updated.version,
            settled = ?committed.transitioned.as_ref().map(|t| t.id),
            correlation_id = ?context.correlation_id,
            "Debit committed"
        );

        Ok(TransactionResult {
            transaction,
            wallet: Some(updated),
            ledger_entry: committed.ledger_entry,
            settled: committed.transitioned,
        })
    }

    /// Pending authorization on this wallet covering `amount`
    async fn load_authorization(
        &self,
        reference: &str,
        wallet: &Wallet,
        amount: i64,
    ) -> Result<Transaction, AppError> {
        let authorization = match self.store.find_transaction_by_reference(reference).await? {
            Some(tx)
                if tx.wallet_id == wallet.id
                    && tx.transaction_type == TransactionType::Authorize =>
            {
                tx
            }
            _ => return Err(DomainError::TransactionNotFound(reference.to_string()).into()),
        };

        authorization.ensure_transition(TransactionStatus::Completed)?;

        if amount > authorization.amount {
            return Err(DomainError::InvalidAmount(format!(
                "debit of {} exceeds authorized {}",
                amount, authorization.amount
            ))
            .into());
        }

        Ok(authorization)
    }
}
