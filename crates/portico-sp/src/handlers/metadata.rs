//! SP metadata publication.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::SpError;

use super::{request_host, SpState};

/// Serve this SP's `EntityDescriptor`.
#[utoipa::path(
    get,
    path = "/saml/sp/metadata",
    responses(
        (status = 200, description = "SP metadata XML"),
        (status = 404, description = "No hosted service provider"),
    ),
    tag = "SAML SP"
)]
pub async fn sp_metadata(State(state): State<SpState>, headers: HeaderMap) -> Response {
    match sp_metadata_inner(&state, &headers) {
        Ok(xml) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/samlmetadata+xml; charset=utf-8",
            )],
            xml,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "metadata rendering failed");
            e.into_response()
        }
    }
}

fn sp_metadata_inner(state: &SpState, headers: &HeaderMap) -> Result<String, SpError> {
    let sp = state.provisioning.default_sp(request_host(headers))?;
    state.service.metadata_xml(&sp)
}
