//! Assertion consumer service: inbound Response on the POST binding.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;

use crate::error::SpError;
use crate::service::AcsOutcome;

use super::{found, request_host, set_session_cookie, SpState};

#[derive(Debug, Deserialize)]
pub struct AcsForm {
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Consume a SAML Response and establish the browser session.
#[utoipa::path(
    post,
    path = "/saml/sp/SSO/alias/{alias}",
    params(("alias" = String, Path, description = "SP alias")),
    responses(
        (status = 302, description = "Sign-on accepted; redirect to the landing URL"),
        (status = 400, description = "Validation failure with diagnostic"),
        (status = 404, description = "Unknown alias"),
    ),
    tag = "SAML SP"
)]
pub async fn assertion_consumer(
    State(state): State<SpState>,
    Path(alias): Path<String>,
    headers: HeaderMap,
    Form(form): Form<AcsForm>,
) -> Response {
    match assertion_consumer_inner(&state, &alias, &headers, &form).await {
        Ok(outcome) => {
            let mut response = found(&outcome.redirect_url);
            set_session_cookie(response.headers_mut(), &outcome.session_id);
            response
        }
        Err(e) => {
            tracing::warn!(error = %e, alias = %alias, "response rejected");
            e.into_response()
        }
    }
}

async fn assertion_consumer_inner(
    state: &SpState,
    alias: &str,
    headers: &HeaderMap,
    form: &AcsForm,
) -> Result<AcsOutcome, SpError> {
    let sp = state.provisioning.resolve(request_host(headers), alias)?;
    let encoded = form
        .saml_response
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SpError::Malformed("missing SAMLResponse form field".to_string()))?;
    state
        .service
        .process_response(&sp, encoded, form.relay_state.as_deref())
        .await
}
