//! Credit Handler
//!
//! Deposits need no balance check, so they take the increment-only write
//! path; the wallet version still moves by one.

use std::sync::Arc;

use crate::domain::{
    CurrencyTable, OperationContext, Transaction, TransactionStatus, TransactionType,
};
use crate::error::AppError;
use crate::idempotency::IdempotencyGuard;
use crate::store::{BalanceMutation, LedgerStore, UnitOfWork};

use super::guards::{self, commit, load_account, load_owned_wallet};
use super::{TransactionResult, WalletOperationCommand};

pub struct CreditHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencyTable>,
    idempotency: IdempotencyGuard,
}

impl CreditHandler {
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
        // Rejects credits that would push the balance out of range
        self.currencies
            .money(&wallet.currency, wallet.balance)?
            .add(&amount)?;

        let transaction = Transaction::new(
            wallet.id,
            TransactionType::Credit,
            amount.minor_units(),
            TransactionStatus::Completed,
            command.reference_id,
        );

        let committed = commit(
            &*self.store,
            UnitOfWork::new()
                .insert(transaction)
                .mutate(BalanceMutation::increment(wallet.id, amount.minor_units()))
                .require_active(wallet.account_id),
            "credit",
        )
        .await?;

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
            correlation_id = ?context.correlation_id,
            "Credit committed"
        );

        Ok(TransactionResult {
            transaction,
            wallet: Some(updated),
            ledger_entry: committed.ledger_entry,
            settled: None,
        })
    }
}
