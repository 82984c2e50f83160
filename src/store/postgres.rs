//! PostgreSQL ledger store
//!
//! A unit of work runs inside one database transaction. The wallet write
//! is a single conditional `UPDATE`; zero rows affected means another
//! writer got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as PgTransaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, EntryDirection, LedgerEntry, Transaction, Wallet,
};

use super::{
    BalanceMutation, Committed, LedgerStore, StatusChange, StoreError, UnitOfWork, WriteCondition,
};

// =========================================================================
// Row mapping
// =========================================================================

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            status: row
                .status
                .parse()
                .map_err(|e: crate::domain::ParseEnumError| StoreError::CorruptRow(e.to_string()))?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    account_id: Uuid,
    balance: i64,
    currency: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            account_id: row.account_id,
            balance: row.balance,
            currency: row.currency,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    wallet_id: Uuid,
    transaction_type: String,
    amount: i64,
    status: String,
    reference_id: String,
    reversal_of: Option<Uuid>,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let corrupt = |e: crate::domain::ParseEnumError| StoreError::CorruptRow(e.to_string());
        Ok(Transaction {
            id: row.id,
            wallet_id: row.wallet_id,
            transaction_type: row.transaction_type.parse().map_err(corrupt)?,
            amount: row.amount,
            status: row.status.parse().map_err(corrupt)?,
            reference_id: row.reference_id,
            reversal_of: row.reversal_of,
            reason: row.reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LedgerEntryRow {
    id: Uuid,
    transaction_id: Uuid,
    wallet_id: Uuid,
    direction: String,
    amount: i64,
    balance_before: i64,
    balance_after: i64,
    sequence: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            id: row.id,
            transaction_id: row.transaction_id,
            wallet_id: row.wallet_id,
            direction: row
                .direction
                .parse()
                .map_err(|e: crate::domain::ParseEnumError| StoreError::CorruptRow(e.to_string()))?,
            amount: row.amount,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            sequence: row.sequence,
            created_at: row.created_at,
        })
    }
}

const TRANSACTION_COLUMNS: &str = "id, wallet_id, type AS transaction_type, amount, status, \
     reference_id, reversal_of, reason, created_at, updated_at";

const WALLET_COLUMNS: &str = "id, account_id, balance, currency, version, created_at, updated_at";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

// =========================================================================
// Store
// =========================================================================

/// Ledger store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Conditional status transition; zero rows means the guard failed
    async fn apply_status_change(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        change: &StatusChange,
    ) -> Result<Transaction, StoreError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            r#"
            UPDATE transactions
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(change.transaction_id)
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let exists: Option<Uuid> =
                    sqlx::query_scalar("SELECT id FROM transactions WHERE id = $1")
                        .bind(change.transaction_id)
                        .fetch_optional(&mut **tx)
                        .await?;
                match exists {
                    Some(_) => Err(StoreError::StatusConflict {
                        transaction_id: change.transaction_id,
                        expected: change.from,
                    }),
                    None => Err(StoreError::TransactionNotFound(change.transaction_id)),
                }
            }
        }
    }

    /// Conditional balance write; returns the wallet after the change
    /// Share-lock the account row for the rest of the transaction so a
    /// concurrent freeze either lands first or waits for this commit
    async fn lock_active_account(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        account_id: Uuid,
    ) -> Result<(), StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM accounts WHERE id = $1 FOR SHARE")
                .bind(account_id)
                .fetch_optional(&mut **tx)
                .await?;

        match status.as_deref().map(str::parse::<AccountStatus>) {
            Some(Ok(AccountStatus::Active)) => Ok(()),
            Some(Ok(_)) => Err(StoreError::AccountFrozen(account_id)),
            Some(Err(_)) => Err(StoreError::CorruptRow(format!(
                "account {} has unknown status",
                account_id
            ))),
            None => Err(StoreError::AccountNotFound(account_id)),
        }
    }

    async fn apply_balance_mutation(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        mutation: &BalanceMutation,
    ) -> Result<Wallet, StoreError> {
        let row: Option<WalletRow> = match mutation.condition {
            WriteCondition::VersionMatches(expected) => {
                sqlx::query_as(&format!(
                    r#"
                    UPDATE wallets
                    SET balance = balance + $2, version = version + 1, updated_at = NOW()
                    WHERE id = $1 AND version = $3
                    RETURNING {WALLET_COLUMNS}
                    "#
                ))
                .bind(mutation.wallet_id)
                .bind(mutation.delta)
                .bind(expected)
                .fetch_optional(&mut **tx)
                .await?
            }
            WriteCondition::IncrementOnly => {
                sqlx::query_as(&format!(
                    r#"
                    UPDATE wallets
                    SET balance = balance + $2, version = version + 1, updated_at = NOW()
                    WHERE id = $1
                    RETURNING {WALLET_COLUMNS}
                    "#
                ))
                .bind(mutation.wallet_id)
                .bind(mutation.delta)
                .fetch_optional(&mut **tx)
                .await?
            }
        };

        match (row, mutation.condition) {
            (Some(row), _) => Ok(row.into()),
            (None, WriteCondition::VersionMatches(_)) => Err(StoreError::VersionConflict {
                wallet_id: mutation.wallet_id,
            }),
            (None, WriteCondition::IncrementOnly) => {
                Err(StoreError::WalletNotFound(mutation.wallet_id))
            }
        }
    }

    async fn insert_transaction(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        transaction: &Transaction,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, wallet_id, type, amount, status,
                reference_id, reversal_of, reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.wallet_id)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.amount)
        .bind(transaction.status.as_str())
        .bind(&transaction.reference_id)
        .bind(transaction.reversal_of)
        .bind(&transaction.reason)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateReference(transaction.reference_id.clone())
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn insert_ledger_entry(
        &self,
        tx: &mut PgTransaction<'_, Postgres>,
        transaction_id: Uuid,
        mutation: &BalanceMutation,
        wallet_after: &Wallet,
    ) -> Result<LedgerEntry, StoreError> {
        let direction = if mutation.delta < 0 {
            EntryDirection::Debit
        } else {
            EntryDirection::Credit
        };
        let balance_after = wallet_after.balance;
        let balance_before = balance_after - mutation.delta;

        let row: LedgerEntryRow = sqlx::query_as(
            r#"
            INSERT INTO ledger_entries (
                id, transaction_id, wallet_id, direction,
                amount, balance_before, balance_after
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, transaction_id, wallet_id, direction, amount,
                      balance_before, balance_after, sequence, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(transaction_id)
        .bind(mutation.wallet_id)
        .bind(direction.as_str())
        .bind(mutation.delta.abs())
        .bind(balance_before)
        .bind(balance_after)
        .fetch_one(&mut **tx)
        .await?;

        row.try_into()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_account(&self, account: &Account, wallet: &Wallet) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO accounts (id, status, created_at) VALUES ($1, $2, $3)")
            .bind(account.id)
            .bind(account.status.as_str())
            .bind(account.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::AccountExists(account.id)
                } else {
                    e.into()
                }
            })?;

        insert_wallet_row(&mut tx, wallet).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_wallet(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_wallet_row(&mut tx, wallet).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> =
            sqlx::query_as("SELECT id, status, created_at FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Account::try_from).transpose()
    }

    async fn set_account_status(
        &self,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            UPDATE accounts SET status = $2
            WHERE id = $1
            RETURNING id, status, created_at
            "#,
        )
        .bind(account_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::AccountNotFound(account_id))?
            .try_into()
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> =
            sqlx::query_as(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"))
                .bind(wallet_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Wallet::from))
    }

    async fn list_wallets(&self, account_id: Uuid) -> Result<Vec<Wallet>, StoreError> {
        let rows: Vec<WalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE account_id = $1 ORDER BY created_at"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Wallet::from).collect())
    }

    async fn get_transaction(
        &self,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, StoreError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Transaction::try_from).transpose()
    }

    async fn find_transaction_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference_id = $1"
        ))
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Transaction::try_from).transpose()
    }

    async fn list_transactions(
        &self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn list_ledger_entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows: Vec<LedgerEntryRow> = sqlx::query_as(
            r#"
            SELECT id, transaction_id, wallet_id, direction, amount,
                   balance_before, balance_after, sequence, created_at
            FROM ledger_entries
            WHERE wallet_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<Committed, StoreError> {
        unit.validate()?;
        let mut tx = self.pool.begin().await?;
        let mut committed = Committed::default();

        if let Some(account_id) = unit.active_account {
            self.lock_active_account(&mut tx, account_id).await?;
        }

        if let Some(change) = &unit.status_change {
            committed.transitioned = Some(self.apply_status_change(&mut tx, change).await?);
        }

        if let Some(transaction) = unit.transaction {
            // Wallet row lock first so concurrent units serialize on it
            let wallet_after = match &unit.balance {
                Some(mutation) => Some(self.apply_balance_mutation(&mut tx, mutation).await?),
                None => None,
            };

            self.insert_transaction(&mut tx, &transaction).await?;

            if let (Some(mutation), Some(wallet)) = (&unit.balance, wallet_after) {
                let entry = self
                    .insert_ledger_entry(&mut tx, transaction.id, mutation, &wallet)
                    .await?;
                committed.ledger_entry = Some(entry);
                committed.wallet = Some(wallet);
            }

            committed.transaction = Some(transaction);
        }

        // Dropping `tx` on any early return rolls everything back
        tx.commit().await?;

        tracing::debug!(
            transaction_id = ?committed.transaction.as_ref().map(|t| t.id),
            wallet_version = ?committed.wallet.as_ref().map(|w| w.version),
            "Unit of work committed"
        );

        Ok(committed)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn insert_wallet_row(
    tx: &mut PgTransaction<'_, Postgres>,
    wallet: &Wallet,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO wallets (id, account_id, balance, currency, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(wallet.id)
    .bind(wallet.account_id)
    .bind(wallet.balance)
    .bind(&wallet.currency)
    .bind(wallet.version)
    .bind(wallet.created_at)
    .bind(wallet.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_foreign_key_violation(&e) {
            StoreError::AccountNotFound(wallet.account_id)
        } else if is_unique_violation(&e) {
            StoreError::WalletExists {
                account_id: wallet.account_id,
                currency: wallet.currency.clone(),
            }
        } else {
            e.into()
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionStatus;

    #[test]
    fn test_status_row_mapping_rejects_unknown_values() {
        let row = TransactionRow {
            id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            transaction_type: "refund".to_string(),
            amount: 1,
            status: TransactionStatus::Pending.as_str().to_string(),
            reference_id: "r".to_string(),
            reversal_of: None,
            reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            Transaction::try_from(row),
            Err(StoreError::CorruptRow(_))
        ));
    }
}
