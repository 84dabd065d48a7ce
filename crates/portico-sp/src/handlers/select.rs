//! IdP selection page.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::SpError;
use crate::saml::build::xml_escape;

use super::{request_host, SpState};

/// Render the provider selection page. One link per configured IdP,
/// pointing at the discovery endpoint with the provider's entity id.
#[utoipa::path(
    get,
    path = "/saml/sp/select",
    responses(
        (status = 200, description = "HTML selection page"),
        (status = 404, description = "No hosted service provider"),
    ),
    tag = "SAML SP"
)]
pub async fn select_idp(State(state): State<SpState>, headers: HeaderMap) -> Response {
    match select_idp_inner(&state, &headers) {
        Ok(html) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            html,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

fn select_idp_inner(state: &SpState, headers: &HeaderMap) -> Result<String, SpError> {
    let sp = state.provisioning.default_sp(request_host(headers))?;

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("    <title>Select an Identity Provider</title>\n");
    html.push_str("</head>\n<body>\n");
    html.push_str("    <h1>Select an Identity Provider</h1>\n    <ul>\n");
    for provider in &sp.config.providers {
        html.push_str("        <li><a href=\"/saml/sp/discovery/alias/");
        html.push_str(&xml_escape(&sp.config.alias));
        html.push_str("?idp=");
        html.push_str(&xml_escape(&urlencoding::encode(&provider.entity_id)));
        html.push_str("\">");
        html.push_str(&xml_escape(&provider.display_name));
        html.push_str("</a></li>\n");
    }
    html.push_str("    </ul>\n</body>\n</html>\n");
    Ok(html)
}
