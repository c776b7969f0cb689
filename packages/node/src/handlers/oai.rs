//! `GET /` and `POST /`: the OAI-PMH request endpoint.

use axum::{
    extract::{Form, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use oaipmh::render_envelope;

use crate::dispatcher::dispatch;
use crate::error::{AppError, XML_CONTENT_TYPE};

use super::AppState;

/// Answers every verb. Protocol errors are `200 OK` envelopes; only store
/// and serialization failures produce a `500`.
pub async fn harvest(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    respond(&state, &pairs).await
}

/// `POST /` with an `application/x-www-form-urlencoded` body.
pub async fn harvest_form(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    respond(&state, &pairs).await
}

async fn respond(state: &AppState, pairs: &[(String, String)]) -> Result<Response, AppError> {
    let envelope = dispatch(state, pairs).await?;
    let body = render_envelope(&envelope)
        .map_err(|e| AppError::Internal(format!("failed to render response: {e}")))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        body,
    )
        .into_response())
}
