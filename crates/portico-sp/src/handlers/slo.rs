//! Single logout endpoint.
//!
//! One route serves three roles, dispatched on the query parameters:
//! no SAML parameter initiates SP-side logout, `SAMLRequest` answers an
//! IdP-initiated logout, `SAMLResponse` completes an SP-initiated one.

use axum::{
    extract::{Path, Query, RawQuery, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::SpError;
use crate::service::{LogoutOutcome, RedirectSignature};

use super::{clear_session_cookie, extract_session_cookie, found, request_host, SpState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct LogoutQuery {
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
    #[serde(rename = "SigAlg")]
    pub sig_alg: Option<String>,
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
}

/// Initiate, answer or complete single logout.
#[utoipa::path(
    get,
    path = "/saml/sp/logout/alias/{alias}",
    params(("alias" = String, Path, description = "SP alias"), LogoutQuery),
    responses(
        (status = 302, description = "Redirect continuing or completing the logout exchange"),
        (status = 400, description = "Validation failure with diagnostic"),
        (status = 404, description = "Unknown alias"),
    ),
    tag = "SAML SP"
)]
pub async fn single_logout(
    State(state): State<SpState>,
    Path(alias): Path<String>,
    Query(query): Query<LogoutQuery>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Response {
    match single_logout_inner(&state, &alias, &query, raw_query.as_deref(), &headers).await {
        Ok(outcome) => {
            let mut response = found(&outcome.redirect_url);
            if outcome.clear_session {
                clear_session_cookie(response.headers_mut());
            }
            response
        }
        Err(e) => {
            tracing::warn!(error = %e, alias = %alias, "logout message rejected");
            e.into_response()
        }
    }
}

async fn single_logout_inner(
    state: &SpState,
    alias: &str,
    query: &LogoutQuery,
    raw_query: Option<&str>,
    headers: &HeaderMap,
) -> Result<LogoutOutcome, SpError> {
    let sp = state.provisioning.resolve(request_host(headers), alias)?;
    let session_id = extract_session_cookie(headers);

    if let Some(encoded) = query.saml_request.as_deref().filter(|v| !v.is_empty()) {
        let signature = detached_signature(query, raw_query);
        return state
            .service
            .process_logout_request(
                &sp,
                encoded,
                query.relay_state.as_deref(),
                signature.as_ref(),
                session_id.as_deref(),
            )
            .await;
    }

    if let Some(encoded) = query.saml_response.as_deref().filter(|v| !v.is_empty()) {
        return state
            .service
            .process_logout_response(&sp, encoded, session_id.as_deref())
            .await;
    }

    state.service.initiate_logout(&sp, session_id.as_deref()).await
}

/// Rebuild the detached signature input from the raw query string. The
/// signature covers parameter values exactly as transmitted, so the
/// URL-decoded values from the `Query` extractor cannot be used.
fn detached_signature(query: &LogoutQuery, raw_query: Option<&str>) -> Option<RedirectSignature> {
    query.sig_alg.as_ref()?;
    query.signature.as_ref()?;
    let raw = raw_query?;

    let mut encoded_message = None;
    let mut relay_state = None;
    let mut sig_alg = None;
    let mut signature = None;
    for pair in raw.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "SAMLRequest" => encoded_message = Some(value.to_string()),
            "RelayState" => relay_state = Some(value.to_string()),
            "SigAlg" => sig_alg = Some(value.to_string()),
            "Signature" => signature = Some(value.to_string()),
            _ => {}
        }
    }

    Some(RedirectSignature {
        encoded_message: encoded_message?,
        relay_state,
        sig_alg: sig_alg?,
        signature: signature?,
    })
}
