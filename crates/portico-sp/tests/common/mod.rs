//! Shared harness: a hosted SP behind the real router, plus a simulated
//! IdP that produces responses with the library's own signing code.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response as HttpResponse, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use tower::ServiceExt;

use portico_sp::clock::SystemClock;
use portico_sp::codec::{saml_decode, saml_encode};
use portico_sp::config::{KeyDescriptor, KeySet, NameIdFormat, RemoteIdpConfig, SpConfig};
use portico_sp::saml::build::{build_logout_request, build_logout_response, build_response};
use portico_sp::saml::messages::{message_id, Status};
use portico_sp::saml::signing::{sign_enveloped, SigningKey};
use portico_sp::saml::{
    Assertion, Conditions, LogoutRequest, LogoutResponse, Response, Subject, SubjectConfirmation,
};
use portico_sp::session::{InMemorySessionStore, RequestTracker};
use portico_sp::{sp_router, Provisioning, ServiceProviderService, SpState};

pub const SP_ENTITY_ID: &str = "spring.security.saml.sp.id";
pub const SP_ALIAS: &str = "boot-sample-sp";
pub const IDP_ENTITY_ID: &str =
    "http://simplesaml-for-spring-saml.cfapps.io/saml2/idp/metadata.php";
pub const IDP_SSO_URL: &str =
    "http://simplesaml-for-spring-saml.cfapps.io/saml2/idp/SSOService.php";
pub const IDP_SLO_URL: &str =
    "http://simplesaml-for-spring-saml.cfapps.io/saml2/idp/SingleLogoutService.php";
pub const PRINCIPAL: &str = "test-user@test.com";
pub const PERSISTENT: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";

pub const ACS_URL: &str = "http://localhost:80/saml/sp/SSO/alias/boot-sample-sp";
pub const SLO_URL: &str = "http://localhost:80/saml/sp/logout/alias/boot-sample-sp";

pub const SP_CERT: &str = include_str!("../fixtures/test-signing.crt");
pub const SP_KEY: &str = include_str!("../fixtures/test-signing.key");
pub const STANDBY_CERT_1: &str = include_str!("../fixtures/other-signing.crt");
pub const STANDBY_CERT_2: &str = include_str!("../fixtures/standby.crt");
pub const IDP_CERT: &str = include_str!("../fixtures/idp-signing.crt");
pub const IDP_KEY: &str = include_str!("../fixtures/idp-signing.key");

/// SP configuration mirroring the sample: signing on, strict correlation
/// off, assertion signatures off unless a test opts in.
pub fn sample_config() -> SpConfig {
    SpConfig {
        entity_id: SP_ENTITY_ID.to_string(),
        alias: SP_ALIAS.to_string(),
        base_url: "http://localhost".to_string(),
        sign_metadata: true,
        sign_requests: true,
        want_assertions_signed: false,
        single_logout_enabled: true,
        keys: KeySet {
            active: KeyDescriptor {
                name: "sp-signing".to_string(),
                certificate: SP_CERT.to_string(),
                private_key: Some(SP_KEY.to_string()),
            },
            standby: vec![
                KeyDescriptor {
                    name: "standby-1".to_string(),
                    certificate: STANDBY_CERT_1.to_string(),
                    private_key: None,
                },
                KeyDescriptor {
                    name: "standby-2".to_string(),
                    certificate: STANDBY_CERT_2.to_string(),
                    private_key: None,
                },
            ],
        },
        name_id_formats: vec![
            NameIdFormat::Unspecified,
            NameIdFormat::Persistent,
            NameIdFormat::Email,
        ],
        providers: vec![RemoteIdpConfig {
            entity_id: IDP_ENTITY_ID.to_string(),
            alias: Some("simplesamlphp".to_string()),
            display_name: "Simple SAML PHP IDP".to_string(),
            sso_url: IDP_SSO_URL.to_string(),
            slo_url: Some(IDP_SLO_URL.to_string()),
            signing_certificates: vec![IDP_CERT.to_string()],
            wants_signed_assertions: false,
            name_id_formats: vec![NameIdFormat::Persistent],
        }],
        response_skew_secs: 300,
        post_login_url: "/".to_string(),
        post_logout_url: "/".to_string(),
        strict_correlation: false,
    }
}

pub fn build_app(config: SpConfig) -> Router {
    let provisioning = Arc::new(Provisioning::single(config).expect("valid test config"));
    let service = Arc::new(ServiceProviderService::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(RequestTracker::new()),
        Arc::new(SystemClock),
    ));
    sp_router(SpState {
        provisioning,
        service,
    })
}

pub async fn get(app: &Router, path: &str) -> HttpResponse<Body> {
    let request = Request::builder()
        .uri(path)
        .header(header::HOST, "localhost")
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get_with_cookie(app: &Router, path: &str, cookie: &str) -> HttpResponse<Body> {
    let request = Request::builder()
        .uri(path)
        .header(header::HOST, "localhost")
        .header(header::COOKIE, format!("sp_session={cookie}"))
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_form(app: &Router, path: &str, body: String) -> HttpResponse<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::HOST, "localhost")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_string(response: HttpResponse<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &HttpResponse<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn session_cookie(response: &HttpResponse<Body>) -> Option<String> {
    let value = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    let (_, rest) = value.split_once("sp_session=")?;
    let session = rest.split(';').next()?.trim();
    if session.is_empty() {
        None
    } else {
        Some(session.to_string())
    }
}

/// Decoded query parameters of a redirect Location.
pub fn query_params(url: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some((_, query)) = url.split_once('?') {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.insert(
                    key.to_string(),
                    urlencoding::decode(value).unwrap().into_owned(),
                );
            }
        }
    }
    params
}

/// Decode a redirect-binding query parameter back to XML.
pub fn decode_redirect_param(value: &str) -> String {
    saml_decode(value, true).expect("valid redirect-binding payload")
}

pub fn assert_status(response: &HttpResponse<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}

/// A matching Response for the hosted SP, as the configured IdP would
/// produce it.
pub fn idp_response(in_response_to: Option<&str>) -> Response {
    let now = Utc::now();
    Response {
        id: message_id("resp"),
        in_response_to: in_response_to.map(str::to_string),
        issue_instant: now,
        destination: Some(ACS_URL.to_string()),
        issuer: IDP_ENTITY_ID.to_string(),
        status: Status::success(),
        assertions: vec![Assertion {
            id: message_id("assertion"),
            issuer: IDP_ENTITY_ID.to_string(),
            issue_instant: now,
            subject: Subject {
                principal: PRINCIPAL.to_string(),
                name_id_format: Some(PERSISTENT.to_string()),
                confirmation: Some(SubjectConfirmation {
                    recipient: Some(ACS_URL.to_string()),
                    not_on_or_after: Some(now + Duration::minutes(5)),
                    in_response_to: in_response_to.map(str::to_string),
                }),
            },
            conditions: Some(Conditions {
                not_before: Some(now - Duration::minutes(5)),
                not_on_or_after: Some(now + Duration::minutes(5)),
                audiences: vec![SP_ENTITY_ID.to_string()],
            }),
            authn_instant: Some(now),
            session_index: Some(message_id("sess")),
            attributes: Vec::new(),
        }],
    }
}

/// POST-binding form body for a Response, optionally signed with the IdP
/// key at the response level.
pub fn acs_form_body(response: &Response, sign: bool) -> String {
    let mut xml = build_response(response);
    if sign {
        let key = SigningKey::from_pem(IDP_CERT, IDP_KEY).expect("IdP key");
        xml = sign_enveloped(&xml, &response.id, &key).expect("signable response");
    }
    let encoded = saml_encode(&xml, false).expect("encodable response");
    format!("SAMLResponse={}", urlencoding::encode(&encoded))
}

/// Drive a full sign-on and return the session cookie.
pub async fn authenticate(app: &Router) -> String {
    let response = idp_response(None);
    let body = acs_form_body(&response, false);
    let http = post_form(app, "/saml/sp/SSO/alias/boot-sample-sp", body).await;
    assert_status(&http, StatusCode::FOUND);
    session_cookie(&http).expect("session cookie after sign-on")
}

/// Redirect-binding query string carrying a LogoutRequest from the IdP.
pub fn idp_logout_request_query() -> String {
    let request = LogoutRequest {
        id: message_id("idp_logout"),
        issue_instant: Utc::now(),
        issuer: IDP_ENTITY_ID.to_string(),
        destination: Some(SLO_URL.to_string()),
        name_id: PRINCIPAL.to_string(),
        name_id_format: Some(PERSISTENT.to_string()),
        session_index: None,
    };
    let encoded = saml_encode(&build_logout_request(&request), true).unwrap();
    format!("SAMLRequest={}", urlencoding::encode(&encoded))
}

/// Redirect-binding query string carrying the IdP's LogoutResponse.
pub fn idp_logout_response_query(in_response_to: Option<&str>, success: bool) -> String {
    let response = LogoutResponse {
        id: message_id("idp_logout_resp"),
        in_response_to: in_response_to.map(str::to_string),
        issue_instant: Utc::now(),
        issuer: IDP_ENTITY_ID.to_string(),
        destination: Some(SLO_URL.to_string()),
        status: if success {
            Status::success()
        } else {
            Status {
                code: "urn:oasis:names:tc:SAML:2.0:status:Responder".to_string(),
                message: Some("logout failed".to_string()),
            }
        },
    };
    let encoded = saml_encode(&build_logout_response(&response), true).unwrap();
    format!("SAMLResponse={}", urlencoding::encode(&encoded))
}
