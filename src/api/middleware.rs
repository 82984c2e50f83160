//! API Middleware
//!
//! Request signing, principal extraction, role checks and request logging.

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderMap, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::domain::{OperationContext, Principal, Role};
use crate::error::AppError;
use crate::signing::{self, SignatureHeaders};

use super::AppState;

pub const ACCOUNT_ID_HEADER: &str = "x-account-id";
pub const ROLE_HEADER: &str = "x-role";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Largest request body accepted for signature verification
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Nonce of a request whose signature has been verified
#[derive(Debug, Clone)]
pub struct VerifiedNonce(pub String);

// =========================================================================
// Request signature verification
// =========================================================================

/// Verify the HMAC signature and claim the nonce of every mutating request
pub async fn signature_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    if matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(request).await);
    }

    // Nested routers see a stripped path; the client signed the full one
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let headers = SignatureHeaders::from_headers(request.headers())
        .map_err(|e| AppError::from(e).into_response())?;

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES).await.map_err(|_| {
        AppError::InvalidRequest("request body too large".to_string()).into_response()
    })?;

    if let Err(err) = state
        .verifier
        .verify(
            parts.method.as_str(),
            &path,
            &headers,
            &bytes,
            signing::now_ms(),
        )
        .await
    {
        tracing::warn!(
            method = %parts.method,
            path = %path,
            error = %err,
            "Request signature rejected"
        );
        return Err(AppError::from(err).into_response());
    }

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(VerifiedNonce(headers.nonce));

    Ok(next.run(request).await)
}

// =========================================================================
// Principal extraction
// =========================================================================

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": message,
            "error_code": "unauthorized"
        })),
    )
        .into_response()
}

/// Build the operation context from the identity layer's headers
pub async fn principal_middleware(
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let account_id = headers
        .get(ACCOUNT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing X-Account-Id header"))?
        .parse::<Uuid>()
        .map_err(|_| unauthorized("Invalid X-Account-Id header"))?;

    let role = headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("Missing X-Role header"))?
        .parse::<Role>()
        .map_err(|_| unauthorized("Invalid X-Role header"))?;

    let mut context = OperationContext::new().with_principal(Principal::new(account_id, role));
    if let Some(correlation_id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uuid>().ok())
    {
        context = context.with_correlation_id(correlation_id);
    }
    context.ensure_correlation_id();
    if let Some(VerifiedNonce(nonce)) = request.extensions().get::<VerifiedNonce>() {
        context = context.with_nonce(nonce.clone());
    }

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

// =========================================================================
// Role check
// =========================================================================

/// Reject non-admin principals on admin routes
pub async fn require_admin_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let is_admin = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.principal)
        .map(|p| p.is_admin());

    match is_admin {
        Some(true) => Ok(next.run(request).await),
        Some(false) => Err((
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Admin role required",
                "error_code": "forbidden"
            })),
        )
            .into_response()),
        None => Err(unauthorized("Missing principal")),
    }
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "x-signature",
    "x-nonce",
    "authorization",
    "cookie",
    "set-cookie",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    // Mask sensitive headers
    let headers = mask_headers_for_logging(request.headers());

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        request_id = ?request_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        request_id = ?request_id,
        "Request completed"
    );

    response
}
