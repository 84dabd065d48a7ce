//! Service Provider configuration model.
//!
//! The configuration document is deserialized from JSON by the hosting
//! binary and validated fail-fast before any provider is provisioned.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// NameID formats this SP can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NameIdFormat {
    Unspecified,
    Persistent,
    Email,
}

impl NameIdFormat {
    /// The SAML 2.0 URN for this format.
    #[must_use]
    pub fn urn(&self) -> &'static str {
        match self {
            NameIdFormat::Unspecified => "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
            NameIdFormat::Persistent => "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent",
            NameIdFormat::Email => "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
        }
    }

    /// Parse a NameID format URN. Unknown URNs map to `None`.
    #[must_use]
    pub fn from_urn(urn: &str) -> Option<Self> {
        match urn {
            "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified" => {
                Some(NameIdFormat::Unspecified)
            }
            "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent" => {
                Some(NameIdFormat::Persistent)
            }
            "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress" => Some(NameIdFormat::Email),
            _ => None,
        }
    }
}

/// A key pair (or bare certificate, for standby verification keys).
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyDescriptor {
    /// Administrator-facing key name
    pub name: String,
    /// X.509 certificate, PEM
    pub certificate: String,
    /// RSA private key, PEM. Standby keys may omit it.
    #[serde(default)]
    pub private_key: Option<String>,
}

impl std::fmt::Debug for KeyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDescriptor")
            .field("name", &self.name)
            .field("certificate", &"[pem]")
            .field("private_key", &self.private_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// The active signing key plus standby verification keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySet {
    pub active: KeyDescriptor,
    #[serde(default)]
    pub standby: Vec<KeyDescriptor>,
}

impl KeySet {
    /// Active key first, then standby keys in configured order.
    pub fn all(&self) -> impl Iterator<Item = &KeyDescriptor> {
        std::iter::once(&self.active).chain(self.standby.iter())
    }
}

/// A remote Identity Provider registered with this SP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIdpConfig {
    /// Entity ID (absolute URI) of the IdP
    pub entity_id: String,
    /// Short path-safe alias
    #[serde(default)]
    pub alias: Option<String>,
    /// Human-readable name for the selection page
    pub display_name: String,
    /// Single sign-on endpoint (HTTP-Redirect binding)
    pub sso_url: String,
    /// Single logout endpoint, if the IdP supports SLO
    #[serde(default)]
    pub slo_url: Option<String>,
    /// Signing certificates (PEM or bare base64 DER), newest first
    #[serde(default)]
    pub signing_certificates: Vec<String>,
    /// Whether this IdP mandates signed assertions regardless of the
    /// local `want_assertions_signed` setting
    #[serde(default)]
    pub wants_signed_assertions: bool,
    /// NameID formats the IdP supports
    #[serde(default = "default_name_ids")]
    pub name_id_formats: Vec<NameIdFormat>,
}

fn default_name_ids() -> Vec<NameIdFormat> {
    vec![
        NameIdFormat::Unspecified,
        NameIdFormat::Persistent,
        NameIdFormat::Email,
    ]
}

fn default_true() -> bool {
    true
}

fn default_skew() -> i64 {
    300
}

fn default_post_login() -> String {
    "/".to_string()
}

fn default_post_logout() -> String {
    "/".to_string()
}

/// Local Service Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpConfig {
    /// Entity ID (absolute URI) naming this SP
    pub entity_id: String,
    /// URL path segment distinguishing this SP on shared routes
    pub alias: String,
    /// External base URL (scheme + host [+ port]) this SP is reachable at
    pub base_url: String,
    /// Sign published metadata with the active key
    #[serde(default = "default_true")]
    pub sign_metadata: bool,
    /// Sign outbound AuthnRequests / LogoutRequests (redirect binding)
    #[serde(default = "default_true")]
    pub sign_requests: bool,
    /// Require a valid signature on inbound assertions
    #[serde(default = "default_true")]
    pub want_assertions_signed: bool,
    /// Publish and serve single logout endpoints
    #[serde(default = "default_true")]
    pub single_logout_enabled: bool,
    /// Active signing key and standby verification keys
    pub keys: KeySet,
    /// NameID formats advertised in metadata
    #[serde(default = "default_name_ids")]
    pub name_id_formats: Vec<NameIdFormat>,
    /// Remote IdPs this SP trusts
    #[serde(default)]
    pub providers: Vec<RemoteIdpConfig>,
    /// Allowed clock skew, seconds, for all time-window checks
    #[serde(default = "default_skew")]
    pub response_skew_secs: i64,
    /// Where to send the browser after successful sign-on
    #[serde(default = "default_post_login")]
    pub post_login_url: String,
    /// Where to send the browser after logout completes
    #[serde(default = "default_post_logout")]
    pub post_logout_url: String,
    /// Reject responses whose InResponseTo is not an in-flight request id.
    /// Disable only for IdP-initiated flows or interop testing.
    #[serde(default = "default_true")]
    pub strict_correlation: bool,
}

/// Configuration problems detected at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SpConfig {
    /// Parse a configuration document from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SpConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entity_id.is_empty() {
            return Err(ConfigError::MissingField("entity_id"));
        }
        if self.alias.is_empty() {
            return Err(ConfigError::MissingField("alias"));
        }
        if self.alias.contains('/') {
            return Err(ConfigError::InvalidValue {
                field: "alias",
                message: "must be a single path segment".to_string(),
            });
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "base_url",
                message: format!("'{}' must be an absolute http(s) URL", self.base_url),
            });
        }
        if self.keys.active.private_key.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "keys.active",
                message: "active key must carry a private key".to_string(),
            });
        }
        if self.name_id_formats.is_empty() {
            return Err(ConfigError::MissingField("name_id_formats"));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.entity_id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "providers",
                    message: format!("duplicate provider entity id '{}'", p.entity_id),
                });
            }
        }
        Ok(())
    }

    /// Base URL with the port made explicit, no trailing slash.
    ///
    /// Endpoint locations are compared by exact string equality, so the
    /// published form is normalized once here.
    #[must_use]
    pub fn normalized_base_url(&self) -> String {
        normalize_base_url(&self.base_url)
    }

    /// Assertion Consumer Service URL for this SP.
    #[must_use]
    pub fn acs_url(&self) -> String {
        format!("{}/saml/sp/SSO/alias/{}", self.normalized_base_url(), self.alias)
    }

    /// Single logout URL for this SP.
    #[must_use]
    pub fn slo_url(&self) -> String {
        format!(
            "{}/saml/sp/logout/alias/{}",
            self.normalized_base_url(),
            self.alias
        )
    }
}

/// Make the port explicit and strip any trailing slash.
fn normalize_base_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let (scheme, rest) = match base.split_once("://") {
        Some((s, r)) => (s, r),
        None => return base.to_string(),
    };
    // Authority only; the configured base URL carries no path.
    if rest.contains(':') {
        return base.to_string();
    }
    let port = match scheme {
        "https" => 443,
        _ => 80,
    };
    format!("{scheme}://{rest}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> String {
        r#"{
            "entity_id": "https://sp.example.com",
            "alias": "example",
            "base_url": "http://localhost",
            "keys": {
                "active": {
                    "name": "key-1",
                    "certificate": "cert-pem",
                    "private_key": "key-pem"
                }
            }
        }"#
        .to_string()
    }

    #[test]
    fn defaults_are_applied() {
        let config = SpConfig::from_json(&minimal_json()).unwrap();
        assert!(config.sign_metadata);
        assert!(config.sign_requests);
        assert!(config.want_assertions_signed);
        assert!(config.single_logout_enabled);
        assert!(config.strict_correlation);
        assert_eq!(config.response_skew_secs, 300);
        assert_eq!(config.post_login_url, "/");
        assert_eq!(
            config.name_id_formats,
            vec![
                NameIdFormat::Unspecified,
                NameIdFormat::Persistent,
                NameIdFormat::Email
            ]
        );
    }

    #[test]
    fn base_url_port_is_made_explicit() {
        let config = SpConfig::from_json(&minimal_json()).unwrap();
        assert_eq!(config.normalized_base_url(), "http://localhost:80");
        assert_eq!(
            config.acs_url(),
            "http://localhost:80/saml/sp/SSO/alias/example"
        );
    }

    #[test]
    fn explicit_port_is_preserved() {
        assert_eq!(
            normalize_base_url("https://sp.example.com:8443/"),
            "https://sp.example.com:8443"
        );
        assert_eq!(
            normalize_base_url("https://sp.example.com"),
            "https://sp.example.com:443"
        );
    }

    #[test]
    fn standby_keys_may_omit_private_key() {
        let json = r#"{
            "entity_id": "https://sp.example.com",
            "alias": "example",
            "base_url": "http://localhost",
            "keys": {
                "active": {
                    "name": "key-1",
                    "certificate": "cert-pem",
                    "private_key": "key-pem"
                },
                "standby": [
                    {"name": "old-1", "certificate": "cert"},
                    {"name": "old-2", "certificate": "cert"}
                ]
            }
        }"#;
        let config = SpConfig::from_json(json).unwrap();
        assert_eq!(config.keys.standby.len(), 2);
        assert!(config.keys.standby[0].private_key.is_none());
    }

    #[test]
    fn active_key_without_private_key_is_rejected() {
        let json = minimal_json().replace("\"private_key\": \"key-pem\"", "\"private_key\": null");
        let err = SpConfig::from_json(&json).unwrap_err();
        assert!(err.to_string().contains("keys.active"));
    }

    #[test]
    fn nameid_urn_round_trip() {
        for f in [
            NameIdFormat::Unspecified,
            NameIdFormat::Persistent,
            NameIdFormat::Email,
        ] {
            assert_eq!(NameIdFormat::from_urn(f.urn()), Some(f));
        }
        assert_eq!(
            NameIdFormat::from_urn("urn:oasis:names:tc:SAML:2.0:nameid-format:transient"),
            None
        );
    }
}
