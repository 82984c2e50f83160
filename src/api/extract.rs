//! Extractors whose rejections use the API error format

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// `Json` with rejections mapped to `invalid_request`
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `Path` with rejections mapped to `invalid_request`
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// `Query` with rejections mapped to `invalid_request`
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
