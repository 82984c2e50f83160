//! API module
//!
//! HTTP API endpoints and middleware.

pub mod extract;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use crate::domain::CurrencyTable;
use crate::signing::RequestVerifier;
use crate::store::LedgerStore;

pub use routes::create_router;

/// Shared state handed to every route and middleware
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub verifier: Arc<RequestVerifier>,
    pub currencies: Arc<CurrencyTable>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        verifier: RequestVerifier,
        currencies: CurrencyTable,
    ) -> Self {
        Self {
            store,
            verifier: Arc::new(verifier),
            currencies: Arc::new(currencies),
        }
    }
}
