//! In-memory ledger store
//!
//! Same contract as the Postgres store: a unit of work is validated in full
//! under one write lock before anything is applied, so a failed commit
//! leaves no trace.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, EntryDirection, LedgerEntry, Transaction, Wallet,
};

use super::{Committed, LedgerStore, StoreError, UnitOfWork, WriteCondition};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    wallets: HashMap<Uuid, Wallet>,
    transactions: HashMap<Uuid, Transaction>,
    references: HashMap<String, Uuid>,
    ledger: Vec<LedgerEntry>,
    next_sequence: i64,
}

/// Ledger store backed by process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_account(&self, account: &Account, wallet: &Wallet) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::AccountExists(account.id));
        }
        state.accounts.insert(account.id, account.clone());
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&wallet.account_id) {
            return Err(StoreError::AccountNotFound(wallet.account_id));
        }
        if state
            .wallets
            .values()
            .any(|w| w.account_id == wallet.account_id && w.currency == wallet.currency)
        {
            return Err(StoreError::WalletExists {
                account_id: wallet.account_id,
                currency: wallet.currency.clone(),
            });
        }
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.state.read().await.accounts.get(&account_id).cloned())
    }

    async fn set_account_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, StoreError> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(StoreError::AccountNotFound(account_id))?;
        account.status = status;
        Ok(account.clone())
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.state.read().await.wallets.get(&wallet_id).cloned())
    }

    async fn list_wallets(&self, account_id: Uuid) -> Result<Vec<Wallet>, StoreError> {
        let state = self.state.read().await;
        let mut wallets: Vec<Wallet> = state
            .wallets
            .values()
            .filter(|w| w.account_id == account_id)
            .cloned()
            .collect();
        wallets.sort_by_key(|w| w.created_at);
        Ok(wallets)
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .get(&transaction_id)
            .cloned())
    }

    async fn find_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .references
            .get(reference_id)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let state = self.state.read().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transactions
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_ledger_entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .ledger
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
        unit.validate()?;
        let mut state = self.state.write().await;

        // Check every guard before touching anything
        if let Some(account_id) = unit.active_account {
            let account = state
                .accounts
                .get(&account_id)
                .ok_or(StoreError::AccountNotFound(account_id))?;
            if account.status != AccountStatus::Active {
                return Err(StoreError::AccountFrozen(account_id));
            }
        }

        if let Some(change) = &unit.status_change {
            let current = state
                .transactions
                .get(&change.transaction_id)
                .ok_or(StoreError::TransactionNotFound(change.transaction_id))?;
            if current.status != change.from {
                return Err(StoreError::StatusConflict {
                    transaction_id: change.transaction_id,
                    expected: change.from,
                });
            }
        }

        if let Some(mutation) = &unit.balance {
            let wallet = state
                .wallets
                .get(&mutation.wallet_id)
                .ok_or(StoreError::WalletNotFound(mutation.wallet_id))?;
            if let WriteCondition::VersionMatches(expected) = mutation.condition {
                if wallet.version != expected {
                    return Err(StoreError::VersionConflict {
                        wallet_id: mutation.wallet_id,
                    });
                }
            }
        }

        if let Some(transaction) = &unit.transaction {
            if state.references.contains_key(&transaction.reference_id) {
                return Err(StoreError::DuplicateReference(
                    transaction.reference_id.clone(),
                ));
            }
        }

        // Apply
        let now = Utc::now();
        let mut committed = Committed::default();

        if let Some(change) = unit.status_change {
            if let Some(current) = state.transactions.get_mut(&change.transaction_id) {
                current.status = change.to;
                current.updated_at = now;
                committed.transitioned = Some(current.clone());
            }
        }

        if let Some(transaction) = unit.transaction {
            state
                .references
                .insert(transaction.reference_id.clone(), transaction.id);
            state.transactions.insert(transaction.id, transaction.clone());

            if let Some(mutation) = unit.balance {
                let (balance_before, balance_after, wallet) = {
                    let wallet = state
                        .wallets
                        .get_mut(&mutation.wallet_id)
                        .ok_or(StoreError::WalletNotFound(mutation.wallet_id))?;
                    let before = wallet.balance;
                    wallet.balance += mutation.delta;
                    wallet.version += 1;
                    wallet.updated_at = now;
                    (before, wallet.balance, wallet.clone())
                };

                state.next_sequence += 1;
                let direction = if mutation.delta < 0 {
                    EntryDirection::Debit
                } else {
                    EntryDirection::Credit
                };
                let entry = LedgerEntry {
                    id: Uuid::new_v4(),
                    transaction_id: transaction.id,
                    wallet_id: mutation.wallet_id,
                    direction,
                    amount: mutation.delta.abs(),
                    balance_before,
                    balance_after,
                    sequence: state.next_sequence,
                    created_at: now,
                };
                state.ledger.push(entry.clone());

                committed.wallet = Some(wallet);
                committed.ledger_entry = Some(entry);
            }

            committed.transaction = Some(transaction);
        }

        Ok(committed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionStatus, TransactionType};
    use crate::store::{BalanceMutation, StatusChange};

    async fn seeded() -> (InMemoryLedgerStore, Wallet) {
        let store = InMemoryLedgerStore::new();
        let account = Account {
            id: Uuid::new_v4(),
            status: AccountStatus::Active,
            created_at: Utc::now(),
        };
        let wallet = Wallet::new(account.id, "USD");
        store.insert_account(&account, &wallet).await.unwrap();
        (store, wallet)
    }

    fn credit_tx(wallet: &Wallet, amount: i64, reference: &str) -> Transaction {
        Transaction::new(
            wallet.id,
            TransactionType::Credit,
            amount,
            TransactionStatus::Completed,
            reference,
        )
    }

    #[tokio::test]
    async fn test_commit_applies_mutation_and_entry() {
        let (store, wallet) = seeded().await;

        let committed = store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 500, "c1"))
                    .mutate(BalanceMutation::checked(&wallet, 500)),
            )
            .await
            .unwrap();

        let updated = committed.wallet.unwrap();
        assert_eq!(updated.balance, 500);
        assert_eq!(updated.version, 1);

        let entry = committed.ledger_entry.unwrap();
        assert_eq!(entry.direction, EntryDirection::Credit);
        assert_eq!((entry.balance_before, entry.balance_after), (0, 500));
    }

    #[tokio::test]
    async fn test_stale_version_rejected_without_side_effects() {
        let (store, wallet) = seeded().await;

        store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 100, "c1"))
                    .mutate(BalanceMutation::checked(&wallet, 100)),
            )
            .await
            .unwrap();

        // Same stale snapshot (version 0) again
        let err = store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 100, "c2"))
                    .mutate(BalanceMutation::checked(&wallet, 100)),
            )
            .await
            .unwrap_err();
        assert!(err.is_concurrency_conflict());

        assert!(store.find_transaction_by_reference("c2").await.unwrap().is_none());
        assert_eq!(store.list_ledger_entries(wallet.id).await.unwrap().len(), 1);
        assert_eq!(store.get_wallet(wallet.id).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_frozen_account_fails_guarded_commit() {
        let (store, wallet) = seeded().await;
        // Snapshot taken while ACTIVE; the freeze lands before commit
        let snapshot = store.get_wallet(wallet.id).await.unwrap().unwrap();
        store
            .set_account_status(wallet.account_id, AccountStatus::Frozen)
            .await
            .unwrap();

        let err = store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 100, "c1"))
                    .mutate(BalanceMutation::checked(&snapshot, 100))
                    .require_active(wallet.account_id),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountFrozen(id) if id == wallet.account_id));
        assert!(store.find_transaction_by_reference("c1").await.unwrap().is_none());

        // Unguarded units still apply
        let committed = store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 100, "c2"))
                    .mutate(BalanceMutation::checked(&snapshot, 100)),
            )
            .await
            .unwrap();
        assert_eq!(committed.wallet.unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_one_wallet_per_currency() {
        let (store, wallet) = seeded().await;

        let err = store
            .insert_wallet(&Wallet::new(wallet.account_id, "usd"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WalletExists { .. }));

        store
            .insert_wallet(&Wallet::new(wallet.account_id, "EUR"))
            .await
            .unwrap();
        assert_eq!(store.list_wallets(wallet.account_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_reference_rejected() {
        let (store, wallet) = seeded().await;

        store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 100, "dup"))
                    .mutate(BalanceMutation::increment(wallet.id, 100)),
            )
            .await
            .unwrap();

        let err = store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 100, "dup"))
                    .mutate(BalanceMutation::increment(wallet.id, 100)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReference(r) if r == "dup"));
        assert_eq!(store.get_wallet(wallet.id).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_status_conflict_rolls_back_whole_unit() {
        let (store, wallet) = seeded().await;
        let committed = store
            .commit(UnitOfWork::new().insert(Transaction::new(
                wallet.id,
                TransactionType::Authorize,
                10,
                TransactionStatus::Pending,
                "a1",
            )))
            .await
            .unwrap();
        let auth = committed.transaction.unwrap();

        let err = store
            .commit(
                UnitOfWork::new()
                    .insert(credit_tx(&wallet, 10, "x"))
                    .mutate(BalanceMutation::increment(wallet.id, 10))
                    .transition(StatusChange {
                        transaction_id: auth.id,
                        from: TransactionStatus::Completed,
                        to: TransactionStatus::Reversed,
                    }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));
        assert!(store.find_transaction_by_reference("x").await.unwrap().is_none());
        assert_eq!(store.get_wallet(wallet.id).await.unwrap().unwrap().version, 0);
    }
}
