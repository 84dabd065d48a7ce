//! Configuration and metadata publication.

mod common;

use axum::http::StatusCode;
use common::*;
use portico_sp::config::NameIdFormat;
use portico_sp::saml::signing::verify_enveloped;
use portico_sp::SpConfig;

const SAMPLE_CONFIG_JSON: &str = include_str!("../../../config/sp.json");

#[test]
fn sample_config_loads_with_expected_shape() {
    let config = SpConfig::from_json(SAMPLE_CONFIG_JSON).expect("sample config parses");
    assert_eq!(config.entity_id, "spring.security.saml.sp.id");
    assert_eq!(config.alias, "boot-sample-sp");
    assert!(config.sign_metadata);
    assert!(config.sign_requests);
    assert!(config.keys.active.private_key.is_some());
    assert_eq!(config.keys.standby.len(), 2);
    assert_eq!(config.providers.len(), 1);
    assert_eq!(config.providers[0].display_name, "Simple SAML PHP IDP");
    config.validate().expect("sample config validates");
}

#[tokio::test]
async fn metadata_document_carries_the_published_contract() {
    let app = build_app(sample_config());
    let response = get(&app, "/saml/sp/metadata").await;
    assert_status(&response, StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/samlmetadata+xml"));

    let xml = body_string(response).await;
    assert!(xml.contains("entityID=\"spring.security.saml.sp.id\""));
    assert!(xml.contains("<md:SingleLogoutService"));
    assert!(xml.contains(
        "Location=\"http://localhost:80/saml/sp/SSO/alias/boot-sample-sp\""
    ));
    for format in [
        NameIdFormat::Unspecified,
        NameIdFormat::Persistent,
        NameIdFormat::Email,
    ] {
        assert!(
            xml.contains(&format!("<md:NameIDFormat>{}</md:NameIDFormat>", format.urn())),
            "missing NameID format {}",
            format.urn()
        );
    }
    assert_eq!(xml.matches("<md:NameIDFormat>").count(), 3);
}

#[tokio::test]
async fn metadata_signature_verifies_against_the_active_certificate() {
    let app = build_app(sample_config());
    let xml = body_string(get(&app, "/saml/sp/metadata").await).await;
    assert!(xml.contains("<ds:Signature"));
    verify_enveloped(&xml, &[SP_CERT.to_string()]).expect("metadata signature verifies");
}

#[tokio::test]
async fn metadata_lists_active_and_standby_keys() {
    let app = build_app(sample_config());
    let xml = body_string(get(&app, "/saml/sp/metadata").await).await;
    // Three signing KeyDescriptors plus the certificate inside ds:Signature.
    assert_eq!(xml.matches("<md:KeyDescriptor use=\"signing\">").count(), 3);
}

#[tokio::test]
async fn single_logout_service_disappears_when_disabled() {
    let mut config = sample_config();
    config.single_logout_enabled = false;
    let app = build_app(config);
    let xml = body_string(get(&app, "/saml/sp/metadata").await).await;
    assert!(!xml.contains("SingleLogoutService"));
}

#[tokio::test]
async fn selection_page_lists_providers_by_display_name() {
    let app = build_app(sample_config());
    let response = get(&app, "/saml/sp/select").await;
    assert_status(&response, StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("<title>Select an Identity Provider</title>"));
    assert!(html.contains("<h1>Select an Identity Provider</h1>"));
    assert!(html.contains("Simple SAML PHP IDP"));
    assert!(html.contains("/saml/sp/discovery/alias/boot-sample-sp?idp="));
}
