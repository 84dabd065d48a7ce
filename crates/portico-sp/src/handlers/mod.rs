//! HTTP handlers for the SP endpoints.

pub mod discovery;
pub mod metadata;
pub mod select;
pub mod slo;
pub mod sso;

use std::sync::Arc;

use axum::http::header::{HeaderMap, HeaderValue, COOKIE, LOCATION, SET_COOKIE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::provisioning::Provisioning;
use crate::service::ServiceProviderService;
use crate::session::SESSION_COOKIE;

/// Application state shared by every SP handler.
#[derive(Clone)]
pub struct SpState {
    pub provisioning: Arc<Provisioning>,
    pub service: Arc<ServiceProviderService>,
}

/// A plain 302 redirect. The SAML bindings call for Found, which none of
/// the `axum::response::Redirect` constructors produce.
pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Request host as sent by the client, without any normalization.
pub(crate) fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::HOST)?.to_str().ok()
}

/// Extract the session id from the `sp_session` cookie.
pub(crate) fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_str = headers.get(COOKIE)?.to_str().ok()?;
    for part in cookie_str.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(&format!("{SESSION_COOKIE}=")) {
            if !value.is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Set the session cookie on a response.
pub(crate) fn set_session_cookie(headers: &mut HeaderMap, session_id: &str) {
    let value = format!("{SESSION_COOKIE}={session_id}; HttpOnly; SameSite=Lax; Path=/");
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(SET_COOKIE, value);
    }
}

/// Expire the session cookie immediately.
pub(crate) fn clear_session_cookie(headers: &mut HeaderMap) {
    let value = format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0");
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(SET_COOKIE, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_extraction_handles_multiple_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; sp_session=abc123; last=x"),
        );
        assert_eq!(extract_session_cookie(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_cookie_value_is_none() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("sp_session="));
        assert_eq!(extract_session_cookie(&headers), None);
    }
}
