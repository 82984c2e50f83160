//! Account administration handlers
//!
//! Opening accounts and wallets and toggling the frozen flag. All of these
//! require the admin role.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Account, AccountStatus, CurrencyTable, OperationContext, Wallet};
use crate::error::AppError;
use crate::store::{LedgerStore, StoreError};

use super::guards::{self, load_account};
use super::{AccountResult, OpenAccountCommand, OpenWalletCommand, SetAccountStatusCommand};

fn resolve_currency(currencies: &CurrencyTable, code: &str) -> Result<String, AppError> {
    currencies
        .get(code)
        .map(|c| c.code().to_string())
        .map_err(|e| AppError::InvalidRequest(e.to_string()))
}

// =========================================================================
// OpenAccountHandler
// =========================================================================

pub struct OpenAccountHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencyTable>,
}

impl OpenAccountHandler {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Arc<CurrencyTable>) -> Self {
        Self { store, currencies }
    }

    /// Create an active account together with its first wallet
    pub async fn execute(
        &self,
        command: OpenAccountCommand,
        context: &OperationContext,
    ) -> Result<AccountResult, AppError> {
        guards::require_admin(context)?;
        let currency = resolve_currency(&self.currencies, &command.currency)?;

        let account = Account {
            id: command.account_id.unwrap_or_else(Uuid::new_v4),
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };
        let wallet = Wallet::new(account.id, &currency);

        self.store.insert_account(&account, &wallet).await?;

        tracing::info!(
            account_id = %account.id,
            wallet_id = %wallet.id,
            currency = %currency,
            "Account opened"
        );

        Ok(AccountResult {
            account,
            wallets: vec![wallet],
        })
    }
}

// =========================================================================
// OpenWalletHandler
// =========================================================================

pub struct OpenWalletHandler {
    store: Arc<dyn LedgerStore>,
    currencies: Arc<CurrencyTable>,
}

impl OpenWalletHandler {
    pub fn new(store: Arc<dyn LedgerStore>, currencies: Arc<CurrencyTable>) -> Self {
        Self { store, currencies }
    }

    /// One wallet per currency per account
    pub async fn execute(
        &self,
        command: OpenWalletCommand,
        context: &OperationContext,
    ) -> Result<Wallet, AppError> {
        guards::require_admin(context)?;
        let currency = resolve_currency(&self.currencies, &command.currency)?;

        let account = load_account(&*self.store, command.account_id).await?;
        let existing = self.store.list_wallets(account.id).await?;
        if existing.iter().any(|w| w.currency == currency) {
            return Err(StoreError::WalletExists {
                account_id: account.id,
                currency,
            }
            .into());
        }

        let wallet = Wallet::new(account.id, &currency);
        self.store.insert_wallet(&wallet).await?;

        tracing::info!(
            account_id = %account.id,
            wallet_id = %wallet.id,
            currency = %currency,
            "Wallet opened"
        );

        Ok(wallet)
    }
}

// =========================================================================
// SetAccountStatusHandler
// =========================================================================

pub struct SetAccountStatusHandler {
    store: Arc<dyn LedgerStore>,
}

impl SetAccountStatusHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Freeze or unfreeze; setting the current status again is a no-op
    pub async fn execute(
        &self,
        command: SetAccountStatusCommand,
        context: &OperationContext,
    ) -> Result<Account, AppError> {
        let admin = guards::require_admin(context)?;

        let account = self
            .store
            .set_account_status(command.account_id, command.status)
            .await?;

        tracing::info!(
            account_id = %account.id,
            status = %account.status,
            admin_id = %admin.account_id,
            "Account status changed"
        );

        Ok(account)
    }
}
