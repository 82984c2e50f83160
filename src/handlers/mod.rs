//! Command Handlers module
//!
//! The transaction engine. Each handler runs its preconditions
//! (principal, idempotency, ownership, account status, funds) and then
//! commits exactly one unit of work to the ledger store.

mod account_handler;
mod authorize_handler;
mod commands;
mod credit_handler;
mod debit_handler;
mod guards;
mod query_handler;
mod reverse_handler;


pub use account_handler::{OpenAccountHandler, OpenWalletHandler, SetAccountStatusHandler};
pub use authorize_handler::AuthorizeHandler;
pub use commands::*;
pub use credit_handler::CreditHandler;
pub use debit_handler::DebitHandler;
pub use query_handler::{WalletQueryHandler, MAX_PAGE_SIZE};
pub use reverse_handler::{AdminReverseHandler, ReverseHandler};
