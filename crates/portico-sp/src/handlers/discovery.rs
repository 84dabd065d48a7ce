//! IdP discovery: turn a provider choice into an AuthnRequest redirect.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::SpError;

use super::{found, request_host, SpState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct DiscoveryQuery {
    /// Entity id of the chosen identity provider
    pub idp: Option<String>,
    /// Opaque state echoed back by the IdP after sign-on
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Start sign-on against the chosen IdP.
#[utoipa::path(
    get,
    path = "/saml/sp/discovery/alias/{alias}",
    params(("alias" = String, Path, description = "SP alias"), DiscoveryQuery),
    responses(
        (status = 302, description = "Redirect to the IdP SSO endpoint with SAMLRequest"),
        (status = 400, description = "Missing or unknown idp parameter"),
        (status = 404, description = "Unknown alias"),
    ),
    tag = "SAML SP"
)]
pub async fn discovery(
    State(state): State<SpState>,
    Path(alias): Path<String>,
    Query(query): Query<DiscoveryQuery>,
    headers: HeaderMap,
) -> Response {
    match discovery_inner(&state, &alias, &query, &headers).await {
        Ok(location) => found(&location),
        Err(e) => {
            tracing::warn!(error = %e, alias = %alias, "discovery rejected");
            e.into_response()
        }
    }
}

async fn discovery_inner(
    state: &SpState,
    alias: &str,
    query: &DiscoveryQuery,
    headers: &HeaderMap,
) -> Result<String, SpError> {
    let sp = state.provisioning.resolve(request_host(headers), alias)?;
    let idp = query
        .idp
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SpError::Malformed("missing idp query parameter".to_string()))?;
    state
        .service
        .discovery_redirect(&sp, idp, query.relay_state.as_deref())
        .await
}
