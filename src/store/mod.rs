//! Ledger storage
//!
//! The engine talks to storage through [`LedgerStore`]. Every balance
//! change goes through [`LedgerStore::commit`], which applies a
//! [`UnitOfWork`] all-or-nothing: the conditional wallet update, the
//! transaction insert, the ledger entry insert and any status transition
//! either all land or none do.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, LedgerEntry, Transaction, TransactionStatus, Wallet,
};

pub use error::StoreError;
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Guard applied to a wallet balance write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Apply only if the stored version still equals the snapshot version
    VersionMatches(i64),
    /// Apply unconditionally; still bumps the version
    IncrementOnly,
}

/// A signed delta against one wallet.
///
/// Positive deltas credit, negative deltas debit. The store writes one
/// ledger entry for the mutation, linked to the unit's transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceMutation {
    pub wallet_id: Uuid,
    pub delta: i64,
    pub condition: WriteCondition,
}

impl BalanceMutation {
    /// Version-checked mutation built from a wallet snapshot
    pub fn checked(snapshot: &Wallet, delta: i64) -> Self {
        Self {
            wallet_id: snapshot.id,
            delta,
            condition: WriteCondition::VersionMatches(snapshot.version),
        }
    }

    /// Increment-only mutation for credits that need no balance check
    pub fn increment(wallet_id: Uuid, delta: i64) -> Self {
        Self {
            wallet_id,
            delta,
            condition: WriteCondition::IncrementOnly,
        }
    }
}

/// Conditional transaction status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub transaction_id: Uuid,
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

/// Everything one ledger operation writes
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    pub transaction: Option<Transaction>,
    pub balance: Option<BalanceMutation>,
    pub status_change: Option<StatusChange>,
    /// Account that must still be ACTIVE when the unit commits
    pub active_account: Option<Uuid>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn mutate(mut self, mutation: BalanceMutation) -> Self {
        self.balance = Some(mutation);
        self
    }

    pub fn transition(mut self, change: StatusChange) -> Self {
        self.status_change = Some(change);
        self
    }

    /// Fail the commit with `AccountFrozen` unless the account is ACTIVE
    /// at commit time
    pub fn require_active(mut self, account_id: Uuid) -> Self {
        self.active_account = Some(account_id);
        self
    }

    /// A balance mutation always needs a transaction to hang its ledger
    /// entry on
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.balance.is_some() && self.transaction.is_none() {
            return Err(StoreError::InvalidUnit(
                "balance mutation without a transaction",
            ));
        }
        if let Some(mutation) = &self.balance {
            if mutation.delta == 0 {
                return Err(StoreError::InvalidUnit("zero balance delta"));
            }
        }
        if self.transaction.is_none() && self.status_change.is_none() {
            return Err(StoreError::InvalidUnit("empty unit of work"));
        }
        Ok(())
    }
}

/// What a committed unit of work produced
#[derive(Debug, Clone, Default)]
pub struct Committed {
    pub transaction: Option<Transaction>,
    pub wallet: Option<Wallet>,
    pub ledger_entry: Option<LedgerEntry>,
    /// Transaction whose status was transitioned
    pub transitioned: Option<Transaction>,
}

/// Storage backend for accounts, wallets, transactions and ledger entries
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a new account together with its first wallet
    async fn insert_account(&self, account: &Account, wallet: &Wallet) -> Result<(), StoreError>;

    /// Persist an additional wallet for an existing account
    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), StoreError>;

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn set_account_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, StoreError>;

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn list_wallets(&self, account_id: Uuid) -> Result<Vec<Wallet>, StoreError>;

    async fn get_transaction(&self, transaction_id: Uuid)
        -> Result<Option<Transaction>, StoreError>;

    async fn find_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, StoreError>;

    /// Newest first
    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// In creation order
    async fn list_ledger_entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Apply a unit of work atomically
    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionType;

    #[test]
    fn test_unit_of_work_validation() {
        let wallet = Wallet::new(Uuid::new_v4(), "USD");

        let orphan = UnitOfWork::new().mutate(BalanceMutation::checked(&wallet, -10));
        assert!(matches!(orphan.validate(), Err(StoreError::InvalidUnit(_))));

        assert!(matches!(
            UnitOfWork::new().validate(),
            Err(StoreError::InvalidUnit(_))
        ));

        let tx = Transaction::new(
            wallet.id,
            TransactionType::Debit,
            10,
            TransactionStatus::Completed,
            "r",
        );
        let zero = UnitOfWork::new()
            .insert(tx.clone())
            .mutate(BalanceMutation::increment(wallet.id, 0));
        assert!(matches!(zero.validate(), Err(StoreError::InvalidUnit(_))));

        let ok = UnitOfWork::new()
            .insert(tx)
            .mutate(BalanceMutation::checked(&wallet, -10));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_checked_mutation_carries_snapshot_version() {
        let mut wallet = Wallet::new(Uuid::new_v4(), "USD");
        wallet.version = 7;
        let mutation = BalanceMutation::checked(&wallet, 5);
        assert_eq!(mutation.condition, WriteCondition::VersionMatches(7));
        assert_eq!(mutation.wallet_id, wallet.id);
    }
}
