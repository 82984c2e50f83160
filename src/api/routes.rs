//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    minor_units_from_json, Account, AccountStatus, DomainError, LedgerEntry, LedgerVerification,
    OperationContext, Transaction, Wallet,
};
use crate::error::AppError;
use crate::handlers::{
    AccountResult, AdminReverseCommand, AdminReverseHandler, AdminReverseResult,
    AuthorizeHandler, CreditHandler, DebitHandler, OpenAccountCommand, OpenAccountHandler,
    OpenWalletCommand, OpenWalletHandler, ReverseCommand, ReverseHandler,
    SetAccountStatusCommand, SetAccountStatusHandler, TransactionResult, WalletOperationCommand,
    WalletQueryHandler,
};

use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::AppState;

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletOperationRequest {
    pub wallet_id: Uuid,
    /// Integer minor units; integral floats are tolerated
    pub amount: Value,
    pub reference_id: String,
    /// Debit only: pending authorization to settle
    #[serde(default)]
    pub authorization_reference_id: Option<String>,
}

impl WalletOperationRequest {
    fn into_command(self) -> Result<WalletOperationCommand, AppError> {
        let amount = match &self.amount {
            Value::Number(number) => minor_units_from_json(number)?,
            other => {
                return Err(DomainError::InvalidAmount(format!(
                    "amount must be a number, got {}",
                    other
                ))
                .into())
            }
        };
        let command = WalletOperationCommand::new(self.wallet_id, amount, self.reference_id);
        Ok(match self.authorization_reference_id {
            Some(reference) => command.settling(reference),
            None => command,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseRequest {
    pub reference_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminReverseRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAccountRequest {
    #[serde(default)]
    pub account_id: Option<Uuid>,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenWalletRequest {
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    let admin = Router::new()
        .route("/admin/accounts", post(open_account))
        .route("/admin/accounts/:account_id/wallets", post(open_wallet))
        .route("/admin/accounts/:account_id/freeze", post(freeze_account))
        .route("/admin/accounts/:account_id/unfreeze", post(unfreeze_account))
        .route(
            "/admin/transactions/:transaction_id/reverse",
            post(admin_reverse),
        )
        .route("/admin/wallets/:wallet_id/verify", get(verify_wallet_ledger))
        .route_layer(middleware::from_fn(
            super::middleware::require_admin_middleware,
        ));

    Router::new()
        .route("/transactions/authorize", post(authorize))
        .route("/transactions/debit", post(debit))
        .route("/transactions/credit", post(credit))
        .route("/transactions/reverse", post(reverse))
        .route("/wallets/:wallet_id", get(get_wallet))
        .route("/wallets/:wallet_id/transactions", get(list_wallet_transactions))
        .route("/wallets/:wallet_id/ledger", get(list_wallet_ledger))
        .route("/accounts/:account_id", get(get_account))
        .merge(admin)
}

// =========================================================================
// Transactions
// =========================================================================

/// POST /transactions/authorize
async fn authorize(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<WalletOperationRequest>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let handler = AuthorizeHandler::new(state.store, state.currencies);
    let result = handler.execute(request.into_command()?, &context).await?;
    Ok((StatusCode::CREATED, Json(result.transaction)))
}

/// POST /transactions/debit
async fn debit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<WalletOperationRequest>,
) -> Result<Json<TransactionResult>, AppError> {
    let handler = DebitHandler::new(state.store, state.currencies);
    let result = handler.execute(request.into_command()?, &context).await?;
    Ok(Json(result))
}

/// POST /transactions/credit
async fn credit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<WalletOperationRequest>,
) -> Result<Json<TransactionResult>, AppError> {
    if request.authorization_reference_id.is_some() {
        return Err(AppError::InvalidRequest(
            "authorizationReferenceId is only valid on debits".to_string(),
        ));
    }
    let handler = CreditHandler::new(state.store, state.currencies);
    let result = handler.execute(request.into_command()?, &context).await?;
    Ok(Json(result))
}

/// POST /transactions/reverse
async fn reverse(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<ReverseRequest>,
) -> Result<Json<Transaction>, AppError> {
    let handler = ReverseHandler::new(state.store);
    let result = handler
        .execute(ReverseCommand::new(request.reference_id), &context)
        .await?;
    Ok(Json(result.transaction))
}

// =========================================================================
// Reads
// =========================================================================

/// GET /wallets/:wallet_id
async fn get_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(wallet_id): ApiPath<Uuid>,
) -> Result<Json<Wallet>, AppError> {
    let wallet = WalletQueryHandler::new(state.store)
        .get_wallet(wallet_id, &context)
        .await?;
    Ok(Json(wallet))
}

/// GET /wallets/:wallet_id/transactions
async fn list_wallet_transactions(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(wallet_id): ApiPath<Uuid>,
    ApiQuery(page): ApiQuery<PageQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let transactions = WalletQueryHandler::new(state.store)
        .list_transactions(wallet_id, page.limit, page.offset, &context)
        .await?;
    Ok(Json(transactions))
}

/// GET /wallets/:wallet_id/ledger
async fn list_wallet_ledger(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(wallet_id): ApiPath<Uuid>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    let entries = WalletQueryHandler::new(state.store)
        .list_ledger_entries(wallet_id, &context)
        .await?;
    Ok(Json(entries))
}

/// GET /accounts/:account_id
async fn get_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(account_id): ApiPath<Uuid>,
) -> Result<Json<AccountResult>, AppError> {
    let account = WalletQueryHandler::new(state.store)
        .get_account(account_id, &context)
        .await?;
    Ok(Json(account))
}

// =========================================================================
// Admin
// =========================================================================

/// POST /admin/accounts
async fn open_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountResult>), AppError> {
    let command = OpenAccountCommand::new(request.currency);
    let command = match request.account_id {
        Some(account_id) => command.with_account_id(account_id),
        None => command,
    };

    let result = OpenAccountHandler::new(state.store, state.currencies)
        .execute(command, &context)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /admin/accounts/:account_id/wallets
async fn open_wallet(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(account_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<OpenWalletRequest>,
) -> Result<(StatusCode, Json<Wallet>), AppError> {
    let wallet = OpenWalletHandler::new(state.store, state.currencies)
        .execute(
            OpenWalletCommand {
                account_id,
                currency: request.currency,
            },
            &context,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

/// POST /admin/accounts/:account_id/freeze
async fn freeze_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(account_id): ApiPath<Uuid>,
) -> Result<Json<Account>, AppError> {
    set_account_status(state, context, account_id, AccountStatus::Frozen).await
}

/// POST /admin/accounts/:account_id/unfreeze
async fn unfreeze_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(account_id): ApiPath<Uuid>,
) -> Result<Json<Account>, AppError> {
    set_account_status(state, context, account_id, AccountStatus::Active).await
}

async fn set_account_status(
    state: AppState,
    context: OperationContext,
    account_id: Uuid,
    status: AccountStatus,
) -> Result<Json<Account>, AppError> {
    let account = SetAccountStatusHandler::new(state.store)
        .execute(SetAccountStatusCommand { account_id, status }, &context)
        .await?;
    Ok(Json(account))
}

/// POST /admin/transactions/:transaction_id/reverse
async fn admin_reverse(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(transaction_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AdminReverseRequest>,
) -> Result<Json<AdminReverseResult>, AppError> {
    let command = AdminReverseCommand::new(transaction_id);
    let command = match request.reason {
        Some(reason) => command.with_reason(reason),
        None => command,
    };

    let result = AdminReverseHandler::new(state.store, state.currencies)
        .execute(command, &context)
        .await?;
    Ok(Json(result))
}

/// GET /admin/wallets/:wallet_id/verify
async fn verify_wallet_ledger(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    ApiPath(wallet_id): ApiPath<Uuid>,
) -> Result<Json<LedgerVerification>, AppError> {
    let report = WalletQueryHandler::new(state.store)
        .verify_ledger(wallet_id, &context)
        .await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(amount: Value) -> WalletOperationRequest {
        serde_json::from_value(json!({
            "walletId": Uuid::nil(),
            "amount": amount,
            "referenceId": "r-1"
        }))
        .unwrap()
    }

    #[test]
    fn test_integral_amounts_accepted() {
        assert_eq!(request(json!(1500)).into_command().unwrap().amount, 1500);
        assert_eq!(request(json!(1500.0)).into_command().unwrap().amount, 1500);
    }

    #[test]
    fn test_non_integral_or_non_numeric_amounts_rejected() {
        for amount in [json!(10.5), json!("100"), json!(null)] {
            assert!(matches!(
                request(amount).into_command(),
                Err(AppError::Domain(DomainError::InvalidAmount(_)))
            ));
        }
    }
}
