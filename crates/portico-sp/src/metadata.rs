//! SP metadata publication and the remote provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{RemoteIdpConfig, SpConfig};
use crate::error::SpError;
use crate::saml::build::xml_escape;
use crate::saml::messages::{message_id, BINDING_POST, BINDING_REDIRECT};
use crate::saml::parse::parse_idp_metadata;
use crate::saml::signing::{parse_certificate, sign_enveloped, SigningKey};

/// Render the hosted SP's `EntityDescriptor`.
///
/// Endpoint locations are derived from the normalized base URL, so the
/// published document always carries an explicit port. Signed when
/// `sign_metadata` and a signing key is available.
pub fn sp_metadata_xml(config: &SpConfig, key: Option<&SigningKey>) -> Result<String, SpError> {
    let document_id = message_id("metadata");

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<md:EntityDescriptor xmlns:md=\"urn:oasis:names:tc:SAML:2.0:metadata\" ID=\"");
    xml.push_str(&document_id);
    xml.push_str("\" entityID=\"");
    xml.push_str(&xml_escape(&config.entity_id));
    xml.push_str("\">");
    xml.push_str("<md:SPSSODescriptor AuthnRequestsSigned=\"");
    xml.push_str(if config.sign_requests { "true" } else { "false" });
    xml.push_str("\" WantAssertionsSigned=\"");
    xml.push_str(if config.want_assertions_signed {
        "true"
    } else {
        "false"
    });
    xml.push_str("\" protocolSupportEnumeration=\"urn:oasis:names:tc:SAML:2.0:protocol\">");

    for descriptor in config.keys.all() {
        xml.push_str("<md:KeyDescriptor use=\"signing\"><ds:KeyInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\"><ds:X509Data><ds:X509Certificate>");
        xml.push_str(&certificate_base64(&descriptor.certificate)?);
        xml.push_str("</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>");
    }

    if config.single_logout_enabled {
        xml.push_str("<md:SingleLogoutService Binding=\"");
        xml.push_str(BINDING_REDIRECT);
        xml.push_str("\" Location=\"");
        xml.push_str(&xml_escape(&config.slo_url()));
        xml.push_str("\"/>");
    }

    for format in &config.name_id_formats {
        xml.push_str("<md:NameIDFormat>");
        xml.push_str(format.urn());
        xml.push_str("</md:NameIDFormat>");
    }

    xml.push_str("<md:AssertionConsumerService Binding=\"");
    xml.push_str(BINDING_POST);
    xml.push_str("\" Location=\"");
    xml.push_str(&xml_escape(&config.acs_url()));
    xml.push_str("\" index=\"0\" isDefault=\"true\"/>");

    xml.push_str("</md:SPSSODescriptor></md:EntityDescriptor>");

    match (config.sign_metadata, key) {
        (true, Some(key)) => sign_enveloped(&xml, &document_id, key),
        _ => Ok(xml),
    }
}

/// Base64 DER form of a PEM (or already-bare) certificate for embedding
/// in metadata.
fn certificate_base64(pem: &str) -> Result<String, SpError> {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let cert = parse_certificate(pem).map_err(SpError::Configuration)?;
    let der = cert
        .to_der()
        .map_err(|e| SpError::Configuration(format!("certificate DER encoding: {e}")))?;
    Ok(STANDARD.encode(der))
}

/// Registry of trusted remote identity providers, keyed by entity id.
#[derive(Default)]
pub struct MetadataStore {
    providers: HashMap<String, Arc<RemoteIdpConfig>>,
}

impl MetadataStore {
    pub fn from_config(config: &SpConfig) -> Self {
        let mut store = Self::default();
        for provider in &config.providers {
            store.register(provider.clone());
        }
        store
    }

    pub fn register(&mut self, provider: RemoteIdpConfig) {
        self.providers
            .insert(provider.entity_id.clone(), Arc::new(provider));
    }

    /// Register a provider from its `EntityDescriptor` document.
    pub fn register_from_xml(
        &mut self,
        xml: &str,
        alias: &str,
        display_name: &str,
    ) -> Result<(), SpError> {
        let parsed = parse_idp_metadata(xml)?;
        let sso_url = parsed.sso_redirect_url.ok_or_else(|| {
            SpError::Configuration(format!(
                "IdP metadata for {} has no redirect-binding SingleSignOnService",
                parsed.entity_id
            ))
        })?;
        self.register(RemoteIdpConfig {
            entity_id: parsed.entity_id,
            alias: Some(alias.to_string()),
            display_name: display_name.to_string(),
            sso_url,
            slo_url: parsed.slo_redirect_url,
            signing_certificates: parsed.certificates,
            wants_signed_assertions: true,
            name_id_formats: Vec::new(),
        });
        Ok(())
    }

    /// Resolve an inbound issuer to a registered provider.
    pub fn remote_provider(&self, entity_id: &str) -> Result<Arc<RemoteIdpConfig>, SpError> {
        self.providers
            .get(entity_id)
            .cloned()
            .ok_or_else(|| SpError::UnknownIssuer(entity_id.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeyDescriptor, KeySet, NameIdFormat};

    const CERT: &str = include_str!("../tests/fixtures/test-signing.crt");
    const KEY: &str = include_str!("../tests/fixtures/test-signing.key");
    const STANDBY_CERT: &str = include_str!("../tests/fixtures/standby.crt");

    fn config() -> SpConfig {
        SpConfig {
            entity_id: "spring.security.saml.sp.id".to_string(),
            alias: "boot-sample-sp".to_string(),
            base_url: "http://localhost".to_string(),
            sign_metadata: false,
            sign_requests: true,
            want_assertions_signed: true,
            single_logout_enabled: true,
            keys: KeySet {
                active: KeyDescriptor {
                    name: "active".to_string(),
                    certificate: CERT.to_string(),
                    private_key: Some(KEY.to_string()),
                },
                standby: vec![KeyDescriptor {
                    name: "standby-1".to_string(),
                    certificate: STANDBY_CERT.to_string(),
                    private_key: None,
                }],
            },
            name_id_formats: vec![NameIdFormat::Persistent, NameIdFormat::Email],
            providers: Vec::new(),
            response_skew_secs: 300,
            post_login_url: "/".to_string(),
            post_logout_url: "/".to_string(),
            strict_correlation: true,
        }
    }

    #[test]
    fn metadata_publishes_acs_with_explicit_port() {
        let xml = sp_metadata_xml(&config(), None).unwrap();
        assert!(xml.contains("entityID=\"spring.security.saml.sp.id\""));
        assert!(xml.contains(
            "Location=\"http://localhost:80/saml/sp/SSO/alias/boot-sample-sp\" index=\"0\" isDefault=\"true\""
        ));
    }

    #[test]
    fn metadata_lists_every_configured_certificate() {
        let xml = sp_metadata_xml(&config(), None).unwrap();
        assert_eq!(xml.matches("<md:KeyDescriptor use=\"signing\">").count(), 2);
    }

    #[test]
    fn slo_endpoint_omitted_when_logout_disabled() {
        let mut config = config();
        config.single_logout_enabled = false;
        let xml = sp_metadata_xml(&config, None).unwrap();
        assert!(!xml.contains("SingleLogoutService"));
    }

    #[test]
    fn signed_metadata_verifies_against_active_cert() {
        let mut config = config();
        config.sign_metadata = true;
        let key = SigningKey::from_pem(CERT, KEY).unwrap();
        let xml = sp_metadata_xml(&config, Some(&key)).unwrap();
        assert!(xml.contains("<ds:Signature"));
        crate::saml::signing::verify_enveloped(&xml, &[CERT.to_string()]).unwrap();
    }

    #[test]
    fn providers_can_be_registered_from_entity_descriptors() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example.com/metadata">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;
        let mut store = MetadataStore::default();
        store
            .register_from_xml(xml, "example-idp", "Example IdP")
            .unwrap();
        let provider = store.remote_provider("https://idp.example.com/metadata").unwrap();
        assert_eq!(provider.sso_url, "https://idp.example.com/sso");
        assert_eq!(provider.display_name, "Example IdP");
    }

    #[test]
    fn unknown_issuer_is_rejected() {
        let store = MetadataStore::from_config(&config());
        assert!(matches!(
            store.remote_provider("https://nowhere.example.com"),
            Err(SpError::UnknownIssuer(_))
        ));
    }
}
