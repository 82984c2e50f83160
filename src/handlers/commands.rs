//! Command definitions
//!
//! Commands represent intentions to change ledger state. Results carry the
//! rows the operation produced.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Account, AccountStatus, LedgerEntry, Transaction, Wallet};

// =========================================================================
// Wallet operations
// =========================================================================

/// Amount-bearing operation against one wallet (authorize, debit, credit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletOperationCommand {
    pub wallet_id: Uuid,
    /// Minor units
    pub amount: i64,
    pub reference_id: String,
    /// Pending authorization settled by a debit
    pub authorization_reference: Option<String>,
}

impl WalletOperationCommand {
    pub fn new(wallet_id: Uuid, amount: i64, reference_id: impl Into<String>) -> Self {
        Self {
            wallet_id,
            amount,
            reference_id: reference_id.into(),
            authorization_reference: None,
        }
    }

    pub fn settling(mut self, authorization_reference: impl Into<String>) -> Self {
        self.authorization_reference = Some(authorization_reference.into());
        self
    }
}

/// Cancel a pending authorization by its reference id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseCommand {
    pub reference_id: String,
}

impl ReverseCommand {
    pub fn new(reference_id: impl Into<String>) -> Self {
        Self {
            reference_id: reference_id.into(),
        }
    }
}

/// Compensate a completed debit or credit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminReverseCommand {
    pub transaction_id: Uuid,
    pub reason: Option<String>,
}

impl AdminReverseCommand {
    pub fn new(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub transaction: Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Wallet>,
    #[serde(rename = "ledgerEntry", skip_serializing_if = "Option::is_none")]
    pub ledger_entry: Option<LedgerEntry>,
    /// Authorization settled alongside a debit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled: Option<Transaction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminReverseResult {
    pub original: Transaction,
    pub reversal: Transaction,
    pub wallet: Wallet,
}

// =========================================================================
// Account administration
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountCommand {
    /// Identity-layer account id; generated when absent
    pub account_id: Option<Uuid>,
    pub currency: String,
}

impl OpenAccountCommand {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            account_id: None,
            currency: currency.into(),
        }
    }

    pub fn with_account_id(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWalletCommand {
    pub account_id: Uuid,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SetAccountStatusCommand {
    pub account_id: Uuid,
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountResult {
    pub account: Account,
    pub wallets: Vec<Wallet>,
}
