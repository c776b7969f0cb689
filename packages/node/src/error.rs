//! Application-level error type returned by handlers.
//!
//! Protocol errors (`badVerb`, `noRecordsMatch`, ...) are not errors here:
//! they are ordinary `200 OK` envelopes. [`AppError`] covers failures the
//! harvester cannot fix by changing its request, and renders them as
//! `500 Internal Server Error` with a small XML body:
//!
//! ```xml
//! <error code="store_backend_error">store backend error: connection refused</error>
//! ```

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use oaipmh::render_application_error;

use crate::adapter::FormatError;
use crate::storage::StoreError;

pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// An error that a handler can return; converts directly to an HTTP response.
#[derive(Debug)]
pub enum AppError {
    /// The store or its backend failed.
    Store(StoreError),
    /// A metadata payload could not be serialized.
    Format(FormatError),
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Store(StoreError::Backend(_)) => "store_backend_error",
            AppError::Store(_) => "store_error",
            AppError::Format(_) => "metadata_format_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            AppError::Store(e) => e.to_string(),
            AppError::Format(e) => e.to_string(),
            AppError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, message) = (self.code(), self.message());
        tracing::error!(code, "request failed: {message}");

        let body = render_application_error(code, &message).unwrap_or_else(|e| {
            tracing::error!("failed to render application error: {e}");
            String::new()
        });
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
            body,
        )
            .into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl From<FormatError> for AppError {
    fn from(e: FormatError) -> Self {
        AppError::Format(e)
    }
}
