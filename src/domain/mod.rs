//! Domain module
//!
//! Core domain types and business logic.

pub mod context;
pub mod error;
pub mod model;
pub mod money;

pub use context::{OperationContext, Principal, Role};
pub use error::DomainError;
pub use model::{
    reversal_reference, verify_ledger, Account, AccountStatus, EntryDirection, LedgerEntry,
    LedgerVerification, ParseEnumError, Transaction, TransactionStatus, TransactionType, Wallet,
    REVERSAL_REFERENCE_PREFIX,
};
pub use money::{minor_units_from_json, Currency, CurrencyTable, Money, MoneyError};
