//! HTTP request handlers.
//!
//! This module contains the endpoint handlers for the application, WebSocket
//! and admin surfaces.

pub mod admin;
pub mod agents;
pub mod dispatch;
pub mod health;
pub mod tools;
pub mod ws;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::ApiError;

/// Unwrap a JSON body, turning extractor rejections into the uniform error body.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
