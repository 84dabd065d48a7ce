//! Typed SAML 2.0 protocol messages.

use chrono::{DateTime, Utc};

pub const NS_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
pub const NS_ASSERTION: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const NS_METADATA: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
pub const STATUS_REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
pub const STATUS_RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";

pub const BINDING_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
pub const BINDING_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

pub const SUBJECT_CONFIRMATION_BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

/// An authentication request this SP sends to an IdP.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthnRequest {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub destination: String,
    pub assertion_consumer_service_url: String,
    /// Requested NameID format URN, if any
    pub name_id_policy: Option<String>,
    pub force_authn: bool,
    pub is_passive: bool,
}

/// Status block of a Response / LogoutResponse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: String,
    pub message: Option<String>,
}

impl Status {
    #[must_use]
    pub fn success() -> Self {
        Status {
            code: STATUS_SUCCESS.to_string(),
            message: None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == STATUS_SUCCESS
    }
}

/// Subject confirmation data carried inside an assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectConfirmation {
    pub recipient: Option<String>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub in_response_to: Option<String>,
}

/// Assertion subject: the authenticated principal.
#[derive(Debug, Clone, PartialEq)]
pub struct Subject {
    pub principal: String,
    pub name_id_format: Option<String>,
    pub confirmation: Option<SubjectConfirmation>,
}

/// Assertion validity conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub audiences: Vec<String>,
}

/// A single attribute from an AttributeStatement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

/// A SAML assertion as consumed by this SP.
#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub id: String,
    pub issuer: String,
    pub issue_instant: DateTime<Utc>,
    pub subject: Subject,
    pub conditions: Option<Conditions>,
    pub authn_instant: Option<DateTime<Utc>>,
    pub session_index: Option<String>,
    pub attributes: Vec<Attribute>,
}

/// An authentication response received at the ACS.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    pub in_response_to: Option<String>,
    pub issue_instant: DateTime<Utc>,
    pub destination: Option<String>,
    pub issuer: String,
    pub status: Status,
    pub assertions: Vec<Assertion>,
}

/// A single logout request (either direction).
#[derive(Debug, Clone, PartialEq)]
pub struct LogoutRequest {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub destination: Option<String>,
    pub name_id: String,
    pub name_id_format: Option<String>,
    pub session_index: Option<String>,
}

/// A single logout response (either direction).
#[derive(Debug, Clone, PartialEq)]
pub struct LogoutResponse {
    pub id: String,
    pub in_response_to: Option<String>,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub destination: Option<String>,
    pub status: Status,
}

/// Fresh message identifier: unpredictable and unique.
#[must_use]
pub fn message_id(prefix: &str) -> String {
    format!("_{prefix}_{}", uuid::Uuid::new_v4())
}

/// Instant formatting shared by every builder, subsecond precision dropped.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_are_unique() {
        let a = message_id("authn");
        let b = message_id("authn");
        assert_ne!(a, b);
        assert!(a.starts_with("_authn_"));
    }

    #[test]
    fn status_success_check() {
        assert!(Status::success().is_success());
        assert!(!Status {
            code: STATUS_REQUESTER.to_string(),
            message: None
        }
        .is_success());
    }
}
