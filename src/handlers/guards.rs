//! Shared preconditions for command handlers

use uuid::Uuid;

use crate::domain::{
    Account, CurrencyTable, DomainError, Money, OperationContext, Principal, TransactionStatus,
    Wallet,
};
use crate::error::AppError;
use crate::store::{Committed, LedgerStore, StoreError, UnitOfWork};

pub(crate) fn require_principal(context: &OperationContext) -> Result<Principal, AppError> {
    context
        .principal
        .ok_or_else(|| AppError::Unauthorized("missing principal".to_string()))
}

pub(crate) fn require_admin(context: &OperationContext) -> Result<Principal, AppError> {
    let principal = require_principal(context)?;
    if !principal.is_admin() {
        return Err(AppError::Forbidden("admin role required".to_string()));
    }
    Ok(principal)
}

/// Wallet that belongs to the caller; anything else reads as not found
pub(crate) async fn load_owned_wallet(
    store: &dyn LedgerStore,
    wallet_id: Uuid,
    principal: &Principal,
) -> Result<Wallet, AppError> {
    match store.get_wallet(wallet_id).await? {
        Some(wallet) if wallet.is_owned_by(principal.account_id) => Ok(wallet),
        _ => Err(DomainError::WalletNotFound(wallet_id).into()),
    }
}

/// Wallet readable by the caller: its owner or an admin
pub(crate) async fn load_visible_wallet(
    store: &dyn LedgerStore,
    wallet_id: Uuid,
    principal: &Principal,
) -> Result<Wallet, AppError> {
    match store.get_wallet(wallet_id).await? {
        Some(wallet) if principal.is_admin() || wallet.is_owned_by(principal.account_id) => {
            Ok(wallet)
        }
        _ => Err(DomainError::WalletNotFound(wallet_id).into()),
    }
}

pub(crate) async fn load_account(
    store: &dyn LedgerStore,
    account_id: Uuid,
) -> Result<Account, AppError> {
    store
        .get_account(account_id)
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(account_id).into())
}

/// Current balance as Money, failing with `InsufficientFunds` below `amount`
pub(crate) fn ensure_sufficient_funds(
    currencies: &CurrencyTable,
    wallet: &Wallet,
    amount: &Money,
) -> Result<Money, AppError> {
    let balance = currencies.money(&wallet.currency, wallet.balance)?;
    if balance.less_than(amount)? {
        return Err(DomainError::insufficient_funds(amount.minor_units(), balance.minor_units()).into());
    }
    Ok(balance)
}

/// Translate a failed conditional status update into the state-machine
/// error the caller would have seen had it read the row a moment later
pub(crate) async fn resolve_status_conflict(
    store: &dyn LedgerStore,
    transaction_id: Uuid,
    requested: TransactionStatus,
) -> AppError {
    match store.get_transaction(transaction_id).await {
        Ok(Some(current)) => match current.ensure_transition(requested) {
            Err(err) => err.into(),
            // Moved and came back within the window; treat as a lost race
            Ok(()) => AppError::Store(StoreError::StatusConflict {
                transaction_id,
                expected: current.status,
            }),
        },
        Ok(None) => DomainError::TransactionNotFound(transaction_id.to_string()).into(),
        Err(err) => err.into(),
    }
}

/// Commit a unit of work, logging conflicts at `warn`
pub(crate) async fn commit(
    store: &dyn LedgerStore,
    unit: UnitOfWork,
    operation: &'static str,
) -> Result<Committed, StoreError> {
    match store.commit(unit).await {
        Ok(committed) => Ok(committed),
        Err(err) => {
            match &err {
                StoreError::VersionConflict { wallet_id } => {
                    tracing::warn!(operation, wallet_id = %wallet_id, "Version conflict");
                }
                StoreError::DuplicateReference(reference_id) => {
                    tracing::warn!(operation, reference_id = %reference_id, "Duplicate reference at commit");
                }
                StoreError::StatusConflict { transaction_id, .. } => {
                    tracing::warn!(operation, transaction_id = %transaction_id, "Status transition lost race");
                }
                StoreError::AccountFrozen(account_id) => {
                    tracing::warn!(operation, account_id = %account_id, "Account frozen before commit");
                }
                StoreError::Unavailable(_) | StoreError::Database(_) => {
                    tracing::error!(operation, error = %err, "Commit failed");
                }
                _ => {}
            }
            Err(err)
        }
    }
}

pub(crate) fn missing(what: &str) -> AppError {
    AppError::Internal(format!("commit did not return {}", what))
}
