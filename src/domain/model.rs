//! Ledger data model
//!
//! Accounts own wallets, wallets own transactions, transactions own ledger
//! entries. Only wallet balances/versions, account status and transaction
//! status ever change after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::DomainError;

/// Error returned when a stored enum column holds an unknown value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// =========================================================================
// Account
// =========================================================================

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountStatus {
    #[default]
    Active,
    Frozen,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Frozen => "FROZEN",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "FROZEN" => Ok(AccountStatus::Frozen),
            _ => Err(ParseEnumError::new("account status", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Reject wallet mutations on a frozen account
    pub fn ensure_active(&self) -> Result<(), DomainError> {
        match self.status {
            AccountStatus::Active => Ok(()),
            AccountStatus::Frozen => Err(DomainError::AccountFrozen(self.id)),
        }
    }
}

// =========================================================================
// Wallet
// =========================================================================

/// A currency-denominated balance owned by one account.
///
/// `version` starts at 0 and moves by exactly one per committed balance
/// mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub account_id: Uuid,
    pub balance: i64,
    pub currency: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(account_id: Uuid, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            balance: 0,
            currency: currency.to_ascii_uppercase(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, account_id: Uuid) -> bool {
        self.account_id == account_id
    }
}

// =========================================================================
// Transaction
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Authorize,
    Debit,
    Credit,
    Reverse,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Authorize => "authorize",
            TransactionType::Debit => "debit",
            TransactionType::Credit => "credit",
            TransactionType::Reverse => "reverse",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorize" => Ok(TransactionType::Authorize),
            "debit" => Ok(TransactionType::Debit),
            "credit" => Ok(TransactionType::Credit),
            "reverse" => Ok(TransactionType::Reverse),
            _ => Err(ParseEnumError::new("transaction type", s)),
        }
    }
}

/// Transaction status state machine.
///
/// `pending -> completed`, `pending -> reversed`, `completed -> reversed`.
/// `reversed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Reversed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Reversed => "reversed",
        }
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (*self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Reversed)
                | (TransactionStatus::Completed, TransactionStatus::Reversed)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "reversed" => Ok(TransactionStatus::Reversed),
            _ => Err(ParseEnumError::new("transaction status", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub status: TransactionStatus,
    pub reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversal_of: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Build a not-yet-persisted transaction
    pub fn new(
        wallet_id: Uuid,
        transaction_type: TransactionType,
        amount: i64,
        status: TransactionStatus,
        reference_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            transaction_type,
            amount,
            status,
            reference_id: reference_id.into(),
            reversal_of: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate a status transition against the state machine
    pub fn ensure_transition(&self, next: TransactionStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            return Ok(());
        }
        if self.status == TransactionStatus::Reversed && next == TransactionStatus::Reversed {
            return Err(DomainError::AlreadyReversed(self.id));
        }
        Err(DomainError::InvalidTransactionState {
            transaction_id: self.id,
            status: self.status,
            requested: next,
        })
    }
}

/// Prefix reserved for compensating transactions; clients may not use it
pub const REVERSAL_REFERENCE_PREFIX: &str = "REV-";

/// Reference id of the compensating transaction for `reference_id`
pub fn reversal_reference(reference_id: &str) -> String {
    format!("{}{}", REVERSAL_REFERENCE_PREFIX, reference_id)
}

// =========================================================================
// Ledger entries
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl EntryDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryDirection::Debit => "debit",
            EntryDirection::Credit => "credit",
        }
    }

    /// Signed balance delta for an entry of `amount` in this direction
    pub fn signed(&self, amount: i64) -> i64 {
        match self {
            EntryDirection::Debit => -amount,
            EntryDirection::Credit => amount,
        }
    }

    pub fn inverse(&self) -> Self {
        match self {
            EntryDirection::Debit => EntryDirection::Credit,
            EntryDirection::Credit => EntryDirection::Debit,
        }
    }
}

impl fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryDirection {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryDirection::Debit),
            "credit" => Ok(EntryDirection::Credit),
            _ => Err(ParseEnumError::new("entry direction", s)),
        }
    }
}

/// Immutable audit row explaining one balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub direction: EntryDirection,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    /// Store-assigned creation order
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn signed_amount(&self) -> i64 {
        self.direction.signed(self.amount)
    }
}

/// Outcome of replaying a wallet's ledger entries from zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerification {
    pub wallet_id: Uuid,
    pub stored_balance: i64,
    pub replayed_balance: i64,
    pub entry_count: usize,
    /// First entry whose `balance_before`/`balance_after` breaks the chain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_broken_entry: Option<Uuid>,
    pub consistent: bool,
}

/// Replay entries (already in creation order) and compare with the wallet
pub fn verify_ledger(wallet: &Wallet, entries: &[LedgerEntry]) -> LedgerVerification {
    let mut running: i64 = 0;
    let mut first_broken_entry = None;

    for entry in entries {
        let expected_after = running.saturating_add(entry.signed_amount());
        if first_broken_entry.is_none()
            && (entry.balance_before != running || entry.balance_after != expected_after)
        {
            first_broken_entry = Some(entry.id);
        }
        running = expected_after;
    }

    LedgerVerification {
        wallet_id: wallet.id,
        stored_balance: wallet.balance,
        replayed_balance: running,
        entry_count: entries.len(),
        first_broken_entry,
        consistent: first_broken_entry.is_none() && running == wallet.balance,
    }
}
