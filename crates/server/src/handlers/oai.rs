//! The protocol endpoint.
//!
//! GET takes its arguments from the query string, POST from an
//! `application/x-www-form-urlencoded` body. Both answer with an XML
//! document; protocol errors are part of that document and still use 200.
//! Only an undecodable query string or body is rejected with 400.

use crate::dispatch::Dispatcher;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::xml;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{Form, Query, State};
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};

/// GET / - Protocol request with query string arguments.
pub async fn oai_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(pairs) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    respond(&state, &headers, &uri, &pairs).await
}

/// POST / - Protocol request with form-encoded arguments.
pub async fn oai_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> ApiResult<Response> {
    let Form(pairs) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    respond(&state, &headers, &uri, &pairs).await
}

async fn respond(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    pairs: &[(String, String)],
) -> ApiResult<Response> {
    let base_url = base_url(state, headers, uri);
    let response = Dispatcher::new(state).dispatch(pairs, base_url).await?;

    Ok(([(CONTENT_TYPE, xml::CONTENT_TYPE)], xml::render(&response)).into_response())
}

/// URL echoed in the `request` element.
///
/// The configured base URL wins; otherwise it is rebuilt from the Host
/// header and the request path.
fn base_url(state: &AppState, headers: &HeaderMap, uri: &Uri) -> String {
    if let Some(base_url) = &state.config.server.base_url {
        return base_url.clone();
    }

    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or("localhost");
    format!("http://{}{}", host, uri.path())
}
