//! Authorize Handler
//!
//! Records a pending authorization. Authorizations place no hold: the
//! balance check runs against the raw balance and nothing is mutated.

use std::sync::Arc;

use crate::domain::{
    CurrencyTable, OperationContext, Transaction, TransactionStatus, TransactionType,
};
use crate::error::AppError;
use crate::idempotency::IdempotencyGuard;
use crate::store::{LedgerStore, UnitOfWork};

use super::guards::{self, commit, ensure_sufficient_funds, load_account, load_owned_wallet};
use super::{TransactionResult, WalletOperationCommand};

pub struct AuthorizeHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencyTable>,
    idempotency: IdempotencyGuard,
}

impl AuthorizeHandler {
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
        ensure_sufficient_funds(&self.currencies, &wallet, &amount)?;

        let transaction = Transaction::new(
            wallet.id,
            TransactionType::Authorize,
            amount.minor_units(),
            TransactionStatus::Pending,
            command.reference_id,
        );

        let committed = commit(
            &*self.store,
            UnitOfWork::new()
                .insert(transaction)
                .require_active(wallet.account_id),
            "authorize",
        )
        .await?;
        let transaction = committed
            .transaction
            .ok_or_else(|| guards::missing("transaction"))?;

        tracing::info!(
            transaction_id = %transaction.id,
            wallet_id = %wallet.id,
            amount = %amount,
            correlation_id = ?context.correlation_id,
            "Authorization recorded"
        );

        Ok(TransactionResult {
            transaction,
            wallet: None,
            ledger_entry: None,
            settled: None,
        })
    }
}
