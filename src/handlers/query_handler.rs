//! Read-side queries over wallets, transactions and ledger entries.
//!
//! Owners see their own wallets; admins see everything.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    verify_ledger, DomainError, LedgerEntry, LedgerVerification, OperationContext, Transaction,
    Wallet,
};
use crate::error::AppError;
use crate::store::LedgerStore;

use super::guards::{self, load_account, load_visible_wallet};
use super::AccountResult;

/// Upper bound on a transaction page
pub const MAX_PAGE_SIZE: i64 = 200;

pub struct WalletQueryHandler {
    store: Arc<dyn LedgerStore>,
}

impl WalletQueryHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn get_wallet(
        &self,
        wallet_id: Uuid,
        context: &OperationContext,
    ) -> Result<Wallet, AppError> {
        let principal = guards::require_principal(context)?;
        load_visible_wallet(&*self.store, wallet_id, &principal).await
    }

    pub async fn get_account(
        &self,
        account_id: Uuid,
        context: &OperationContext,
    ) -> Result<AccountResult, AppError> {
        let principal = guards::require_principal(context)?;
        if !principal.is_admin() && principal.account_id != account_id {
            return Err(DomainError::AccountNotFound(account_id).into());
        }

        let account = load_account(&*self.store, account_id).await?;
        let wallets = self.store.list_wallets(account_id).await?;
        Ok(AccountResult { account, wallets })
    }

    /// Newest first
    pub async fn list_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
        context: &OperationContext,
    ) -> Result<Vec<Transaction>, AppError> {
        let principal = guards::require_principal(context)?;
        let wallet = load_visible_wallet(&*self.store, wallet_id, &principal).await?;

        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let offset = offset.max(0);
        Ok(self.store.list_transactions(wallet.id, limit, offset).await?)
    }

    /// In creation order
    pub async fn list_ledger_entries(
        &self,
        wallet_id: Uuid,
        context: &OperationContext,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let principal = guards::require_principal(context)?;
        let wallet = load_visible_wallet(&*self.store, wallet_id, &principal).await?;
        Ok(self.store.list_ledger_entries(wallet.id).await?)
    }

    /// Replay the wallet's entries and compare against the stored balance
    pub async fn verify_ledger(
        &self,
        wallet_id: Uuid,
        context: &OperationContext,
    ) -> Result<LedgerVerification, AppError> {
        let principal = guards::require_admin(context)?;
        let wallet = load_visible_wallet(&*self.store, wallet_id, &principal).await?;
        let entries = self.store.list_ledger_entries(wallet.id).await?;

        let report = verify_ledger(&wallet, &entries);
        if report.consistent {
            tracing::debug!(wallet_id = %wallet.id, entries = report.entry_count, "Ledger verified");
        } else {
            tracing::error!(
                wallet_id = %wallet.id,
                stored_balance = report.stored_balance,
                replayed_balance = report.replayed_balance,
                first_broken_entry = ?report.first_broken_entry,
                "Ledger inconsistency detected"
            );
        }
        Ok(report)
    }
}
