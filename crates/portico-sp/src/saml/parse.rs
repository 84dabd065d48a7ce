//! Inbound SAML XML parsing.
//!
//! Pull-based parsing over `quick-xml` events. Parsers are lenient about
//! namespace prefixes (matching on local names) and strict about the
//! attributes the protocol engine depends on.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::SpError;

use super::messages::{
    Assertion, Attribute, AuthnRequest, Conditions, LogoutRequest, LogoutResponse, Response,
    Status, Subject, SubjectConfirmation, BINDING_REDIRECT,
};

/// A message arriving on the single logout endpoint, which serves both
/// the SP-initiated and IdP-initiated directions.
#[derive(Debug)]
pub enum LogoutMessage {
    Request(LogoutRequest),
    Response(LogoutResponse),
}

/// Any protocol message, dispatched on the document element.
#[derive(Debug, PartialEq)]
pub enum SamlObject {
    AuthnRequest(AuthnRequest),
    Response(Response),
    LogoutRequest(LogoutRequest),
    LogoutResponse(LogoutResponse),
}

/// Parse any supported protocol message.
pub fn from_xml(xml: &str) -> Result<SamlObject, SpError> {
    match root_element(xml)?.as_str() {
        "AuthnRequest" => Ok(SamlObject::AuthnRequest(parse_authn_request(xml)?)),
        "Response" => Ok(SamlObject::Response(parse_response(xml)?)),
        "LogoutRequest" => Ok(SamlObject::LogoutRequest(parse_logout_request(xml)?)),
        "LogoutResponse" => Ok(SamlObject::LogoutResponse(parse_logout_response(xml)?)),
        other => Err(SpError::Malformed(format!(
            "unsupported document element: {other}"
        ))),
    }
}

/// IdP endpoints and trust anchors lifted from an `EntityDescriptor`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIdpMetadata {
    pub entity_id: String,
    pub sso_redirect_url: Option<String>,
    pub slo_redirect_url: Option<String>,
    pub certificates: Vec<String>,
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, SpError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SpError::Malformed(format!("invalid timestamp: {value}")))
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn required_attr(e: &BytesStart<'_>, name: &[u8], element: &str) -> Result<String, SpError> {
    attr(e, name).ok_or_else(|| {
        SpError::Malformed(format!(
            "{element} missing {} attribute",
            String::from_utf8_lossy(name)
        ))
    })
}

fn bool_attr(e: &BytesStart<'_>, name: &[u8]) -> bool {
    attr(e, name).as_deref() == Some("true")
}

/// Local name of the document root, used to dispatch logout messages.
fn root_element(xml: &str) -> Result<String, SpError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return Err(SpError::Malformed("empty document".to_string())),
            Err(e) => return Err(SpError::Malformed(format!("XML parse error: {e}"))),
            _ => {}
        }
    }
}

/// Parse an `AuthnRequest` document.
pub fn parse_authn_request(xml: &str) -> Result<AuthnRequest, SpError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut id = None;
    let mut issue_instant = None;
    let mut destination = None;
    let mut acs_url = None;
    let mut force_authn = false;
    let mut is_passive = false;
    let mut issuer = None;
    let mut name_id_policy = None;
    let mut in_issuer = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"AuthnRequest" => {
                    id = Some(required_attr(&e, b"ID", "AuthnRequest")?);
                    issue_instant = Some(parse_instant(&required_attr(
                        &e,
                        b"IssueInstant",
                        "AuthnRequest",
                    )?)?);
                    destination = attr(&e, b"Destination");
                    acs_url = attr(&e, b"AssertionConsumerServiceURL");
                    force_authn = bool_attr(&e, b"ForceAuthn");
                    is_passive = bool_attr(&e, b"IsPassive");
                }
                b"Issuer" => in_issuer = true,
                b"NameIDPolicy" => name_id_policy = attr(&e, b"Format"),
                _ => {}
            },
            Ok(Event::Text(t)) if in_issuer => {
                issuer = Some(
                    t.unescape()
                        .map_err(|e| SpError::Malformed(format!("XML parse error: {e}")))?
                        .into_owned(),
                );
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"Issuer" => in_issuer = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpError::Malformed(format!("XML parse error: {e}"))),
            _ => {}
        }
    }

    Ok(AuthnRequest {
        id: id.ok_or_else(|| SpError::Malformed("not an AuthnRequest".to_string()))?,
        issue_instant: issue_instant
            .ok_or_else(|| SpError::Malformed("AuthnRequest missing IssueInstant".to_string()))?,
        issuer: issuer
            .ok_or_else(|| SpError::Malformed("AuthnRequest missing Issuer".to_string()))?,
        destination: destination
            .ok_or_else(|| SpError::Malformed("AuthnRequest missing Destination".to_string()))?,
        assertion_consumer_service_url: acs_url.ok_or_else(|| {
            SpError::Malformed("AuthnRequest missing AssertionConsumerServiceURL".to_string())
        })?,
        name_id_policy,
        force_authn,
        is_passive,
    })
}

/// Parse a `Response` document, including its assertions.
///
/// Only structural validity is checked here. Signatures, time windows
/// and the rest of the acceptance pipeline are the engine's concern.
pub fn parse_response(xml: &str) -> Result<Response, SpError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut response_seen = false;
    let mut id = None;
    let mut in_response_to = None;
    let mut issue_instant = None;
    let mut destination = None;
    let mut issuer: Option<String> = None;
    let mut status_code = None;
    let mut status_message = None;
    let mut assertions = Vec::new();

    // Assertion under construction, if any.
    let mut assertion: Option<PartialAssertion> = None;
    // Local name of the element whose text content we are inside.
    let mut text_target: Option<&'static [u8]> = None;
    let mut in_signature = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = e.local_name();
                if in_signature {
                    continue;
                }
                match local.as_ref() {
                    b"Signature" => {
                        // Empty Signature elements do not occur; Start is
                        // matched again by the End arm below.
                        in_signature = true;
                    }
                    b"Response" => {
                        response_seen = true;
                        id = Some(required_attr(&e, b"ID", "Response")?);
                        in_response_to = attr(&e, b"InResponseTo");
                        issue_instant = Some(parse_instant(&required_attr(
                            &e,
                            b"IssueInstant",
                            "Response",
                        )?)?);
                        destination = attr(&e, b"Destination");
                    }
                    b"Assertion" => {
                        assertion = Some(PartialAssertion {
                            id: required_attr(&e, b"ID", "Assertion")?,
                            issue_instant: Some(parse_instant(&required_attr(
                                &e,
                                b"IssueInstant",
                                "Assertion",
                            )?)?),
                            ..PartialAssertion::default()
                        });
                    }
                    b"Issuer" => text_target = Some(b"Issuer"),
                    b"StatusCode" => {
                        status_code = Some(required_attr(&e, b"Value", "StatusCode")?);
                    }
                    b"StatusMessage" => text_target = Some(b"StatusMessage"),
                    b"NameID" => {
                        if let Some(a) = assertion.as_mut() {
                            a.name_id_format = attr(&e, b"Format");
                        }
                        text_target = Some(b"NameID");
                    }
                    b"SubjectConfirmationData" => {
                        if let Some(a) = assertion.as_mut() {
                            let not_on_or_after = match attr(&e, b"NotOnOrAfter") {
                                Some(v) => Some(parse_instant(&v)?),
                                None => None,
                            };
                            a.confirmation = Some(SubjectConfirmation {
                                recipient: attr(&e, b"Recipient"),
                                not_on_or_after,
                                in_response_to: attr(&e, b"InResponseTo"),
                            });
                        }
                    }
                    b"Conditions" => {
                        if let Some(a) = assertion.as_mut() {
                            let not_before = match attr(&e, b"NotBefore") {
                                Some(v) => Some(parse_instant(&v)?),
                                None => None,
                            };
                            let not_on_or_after = match attr(&e, b"NotOnOrAfter") {
                                Some(v) => Some(parse_instant(&v)?),
                                None => None,
                            };
                            a.conditions = Some(Conditions {
                                not_before,
                                not_on_or_after,
                                audiences: Vec::new(),
                            });
                        }
                    }
                    b"Audience" => text_target = Some(b"Audience"),
                    b"AuthnStatement" => {
                        if let Some(a) = assertion.as_mut() {
                            a.authn_instant = Some(parse_instant(&required_attr(
                                &e,
                                b"AuthnInstant",
                                "AuthnStatement",
                            )?)?);
                            a.session_index = attr(&e, b"SessionIndex");
                        }
                    }
                    b"Attribute" => {
                        if let Some(a) = assertion.as_mut() {
                            a.current_attribute = Some(Attribute {
                                name: required_attr(&e, b"Name", "Attribute")?,
                                values: Vec::new(),
                            });
                        }
                    }
                    b"AttributeValue" => text_target = Some(b"AttributeValue"),
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if in_signature {
                    continue;
                }
                let Some(target) = text_target else { continue };
                let text = t
                    .unescape()
                    .map_err(|e| SpError::Malformed(format!("XML parse error: {e}")))?
                    .into_owned();
                match target {
                    b"Issuer" => match assertion.as_mut() {
                        Some(a) => a.issuer = Some(text),
                        None => issuer = Some(text),
                    },
                    b"StatusMessage" => status_message = Some(text),
                    b"NameID" => {
                        if let Some(a) = assertion.as_mut() {
                            a.principal = Some(text);
                        }
                    }
                    b"Audience" => {
                        if let Some(c) =
                            assertion.as_mut().and_then(|a| a.conditions.as_mut())
                        {
                            c.audiences.push(text);
                        }
                    }
                    b"AttributeValue" => {
                        if let Some(attr) =
                            assertion.as_mut().and_then(|a| a.current_attribute.as_mut())
                        {
                            attr.values.push(text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"Signature" => in_signature = false,
                b"Assertion" => {
                    if let Some(partial) = assertion.take() {
                        assertions.push(partial.finish()?);
                    }
                }
                b"Attribute" => {
                    if let Some(a) = assertion.as_mut() {
                        if let Some(attr) = a.current_attribute.take() {
                            a.attributes.push(attr);
                        }
                    }
                }
                _ => text_target = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpError::Malformed(format!("XML parse error: {e}"))),
            _ => {}
        }
    }

    if !response_seen {
        return Err(SpError::Malformed("not a Response".to_string()));
    }

    Ok(Response {
        id: id.ok_or_else(|| SpError::Malformed("Response missing ID".to_string()))?,
        in_response_to,
        issue_instant: issue_instant
            .ok_or_else(|| SpError::Malformed("Response missing IssueInstant".to_string()))?,
        destination,
        issuer: issuer
            .ok_or_else(|| SpError::Malformed("Response missing Issuer".to_string()))?,
        status: Status {
            code: status_code
                .ok_or_else(|| SpError::Malformed("Response missing StatusCode".to_string()))?,
            message: status_message,
        },
        assertions,
    })
}

#[derive(Default)]
struct PartialAssertion {
    id: String,
    issue_instant: Option<DateTime<Utc>>,
    issuer: Option<String>,
    principal: Option<String>,
    name_id_format: Option<String>,
    confirmation: Option<SubjectConfirmation>,
    conditions: Option<Conditions>,
    authn_instant: Option<DateTime<Utc>>,
    session_index: Option<String>,
    attributes: Vec<Attribute>,
    current_attribute: Option<Attribute>,
}

impl PartialAssertion {
    fn finish(self) -> Result<Assertion, SpError> {
        Ok(Assertion {
            id: self.id,
            issuer: self
                .issuer
                .ok_or_else(|| SpError::Malformed("Assertion missing Issuer".to_string()))?,
            issue_instant: self
                .issue_instant
                .ok_or_else(|| SpError::Malformed("Assertion missing IssueInstant".to_string()))?,
            subject: Subject {
                principal: self.principal.ok_or_else(|| {
                    SpError::Malformed("Assertion missing Subject NameID".to_string())
                })?,
                name_id_format: self.name_id_format,
                confirmation: self.confirmation,
            },
            conditions: self.conditions,
            authn_instant: self.authn_instant,
            session_index: self.session_index,
            attributes: self.attributes,
        })
    }
}

/// Parse a `LogoutRequest` document.
pub fn parse_logout_request(xml: &str) -> Result<LogoutRequest, SpError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut id = None;
    let mut issue_instant = None;
    let mut destination = None;
    let mut issuer = None;
    let mut name_id = None;
    let mut name_id_format = None;
    let mut session_index = None;
    let mut text_target: Option<&'static [u8]> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"LogoutRequest" => {
                    id = Some(required_attr(&e, b"ID", "LogoutRequest")?);
                    issue_instant = Some(parse_instant(&required_attr(
                        &e,
                        b"IssueInstant",
                        "LogoutRequest",
                    )?)?);
                    destination = attr(&e, b"Destination");
                }
                b"Issuer" => text_target = Some(b"Issuer"),
                b"NameID" => {
                    name_id_format = attr(&e, b"Format");
                    text_target = Some(b"NameID");
                }
                b"SessionIndex" => text_target = Some(b"SessionIndex"),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                let Some(target) = text_target else { continue };
                let text = t
                    .unescape()
                    .map_err(|e| SpError::Malformed(format!("XML parse error: {e}")))?
                    .into_owned();
                match target {
                    b"Issuer" => issuer = Some(text),
                    b"NameID" => name_id = Some(text),
                    b"SessionIndex" => session_index = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => text_target = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpError::Malformed(format!("XML parse error: {e}"))),
            _ => {}
        }
    }

    Ok(LogoutRequest {
        id: id.ok_or_else(|| SpError::Malformed("not a LogoutRequest".to_string()))?,
        issue_instant: issue_instant
            .ok_or_else(|| SpError::Malformed("LogoutRequest missing IssueInstant".to_string()))?,
        issuer: issuer
            .ok_or_else(|| SpError::Malformed("LogoutRequest missing Issuer".to_string()))?,
        destination,
        name_id: name_id
            .ok_or_else(|| SpError::Malformed("LogoutRequest missing NameID".to_string()))?,
        name_id_format,
        session_index,
    })
}

/// Parse a `LogoutResponse` document.
pub fn parse_logout_response(xml: &str) -> Result<LogoutResponse, SpError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut id = None;
    let mut in_response_to = None;
    let mut issue_instant = None;
    let mut destination = None;
    let mut issuer = None;
    let mut status_code = None;
    let mut status_message = None;
    let mut text_target: Option<&'static [u8]> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"LogoutResponse" => {
                    id = Some(required_attr(&e, b"ID", "LogoutResponse")?);
                    in_response_to = attr(&e, b"InResponseTo");
                    issue_instant = Some(parse_instant(&required_attr(
                        &e,
                        b"IssueInstant",
                        "LogoutResponse",
                    )?)?);
                    destination = attr(&e, b"Destination");
                }
                b"Issuer" => text_target = Some(b"Issuer"),
                b"StatusCode" => {
                    status_code = Some(required_attr(&e, b"Value", "StatusCode")?);
                }
                b"StatusMessage" => text_target = Some(b"StatusMessage"),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                let Some(target) = text_target else { continue };
                let text = t
                    .unescape()
                    .map_err(|e| SpError::Malformed(format!("XML parse error: {e}")))?
                    .into_owned();
                match target {
                    b"Issuer" => issuer = Some(text),
                    b"StatusMessage" => status_message = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => text_target = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpError::Malformed(format!("XML parse error: {e}"))),
            _ => {}
        }
    }

    Ok(LogoutResponse {
        id: id.ok_or_else(|| SpError::Malformed("not a LogoutResponse".to_string()))?,
        in_response_to,
        issue_instant: issue_instant
            .ok_or_else(|| SpError::Malformed("LogoutResponse missing IssueInstant".to_string()))?,
        issuer: issuer
            .ok_or_else(|| SpError::Malformed("LogoutResponse missing Issuer".to_string()))?,
        destination,
        status: Status {
            code: status_code
                .ok_or_else(|| SpError::Malformed("LogoutResponse missing StatusCode".to_string()))?,
            message: status_message,
        },
    })
}

/// Dispatch on the root element of a message arriving on the logout
/// endpoint, which may carry either direction of the exchange.
pub fn parse_logout_message(xml: &str) -> Result<LogoutMessage, SpError> {
    match root_element(xml)?.as_str() {
        "LogoutRequest" => Ok(LogoutMessage::Request(parse_logout_request(xml)?)),
        "LogoutResponse" => Ok(LogoutMessage::Response(parse_logout_response(xml)?)),
        other => Err(SpError::Malformed(format!(
            "unexpected logout message root: {other}"
        ))),
    }
}

/// Extract SP-relevant endpoints and signing certificates from an IdP
/// `EntityDescriptor` document.
pub fn parse_idp_metadata(xml: &str) -> Result<ParsedIdpMetadata, SpError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entity_id = None;
    let mut sso_redirect_url = None;
    let mut slo_redirect_url = None;
    let mut certificates = Vec::new();
    let mut in_certificate = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"EntityDescriptor" => {
                    entity_id = Some(required_attr(&e, b"entityID", "EntityDescriptor")?);
                }
                b"SingleSignOnService" => {
                    if attr(&e, b"Binding").as_deref() == Some(BINDING_REDIRECT) {
                        sso_redirect_url = attr(&e, b"Location");
                    }
                }
                b"SingleLogoutService" => {
                    if attr(&e, b"Binding").as_deref() == Some(BINDING_REDIRECT) {
                        slo_redirect_url = attr(&e, b"Location");
                    }
                }
                b"X509Certificate" => in_certificate = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_certificate => {
                let text = t
                    .unescape()
                    .map_err(|e| SpError::Malformed(format!("XML parse error: {e}")))?;
                let compact: String = text.split_whitespace().collect();
                if !compact.is_empty() {
                    certificates.push(compact);
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"X509Certificate" => {
                in_certificate = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(SpError::Malformed(format!("XML parse error: {e}"))),
            _ => {}
        }
    }

    Ok(ParsedIdpMetadata {
        entity_id: entity_id
            .ok_or_else(|| SpError::Malformed("not an EntityDescriptor".to_string()))?,
        sso_redirect_url,
        slo_redirect_url,
        certificates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::build::{
        build_authn_request, build_logout_request, build_logout_response, build_response,
    };
    use crate::saml::messages::{message_id, STATUS_SUCCESS};
    use chrono::{Duration, TimeZone};

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    #[test]
    fn authn_request_round_trips() {
        let request = AuthnRequest {
            id: message_id("authn"),
            issue_instant: instant(),
            issuer: "https://sp.example.com/metadata".to_string(),
            destination: "https://idp.example.com/sso".to_string(),
            assertion_consumer_service_url: "https://sp.example.com/saml/sp/SSO/alias/sp"
                .to_string(),
            name_id_policy: Some(
                "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent".to_string(),
            ),
            force_authn: true,
            is_passive: false,
        };
        let parsed = parse_authn_request(&build_authn_request(&request)).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn response_with_assertion_round_trips() {
        let now = instant();
        let response = Response {
            id: message_id("resp"),
            in_response_to: Some("_authn_abc".to_string()),
            issue_instant: now,
            destination: Some("https://sp.example.com/saml/sp/SSO/alias/sp".to_string()),
            issuer: "https://idp.example.com/metadata".to_string(),
            status: Status::success(),
            assertions: vec![Assertion {
                id: message_id("assertion"),
                issuer: "https://idp.example.com/metadata".to_string(),
                issue_instant: now,
                subject: Subject {
                    principal: "test-user@test.com".to_string(),
                    name_id_format: Some(
                        "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent".to_string(),
                    ),
                    confirmation: Some(SubjectConfirmation {
                        recipient: Some(
                            "https://sp.example.com/saml/sp/SSO/alias/sp".to_string(),
                        ),
                        not_on_or_after: Some(now + Duration::minutes(2)),
                        in_response_to: Some("_authn_abc".to_string()),
                    }),
                },
                conditions: Some(Conditions {
                    not_before: Some(now - Duration::minutes(2)),
                    not_on_or_after: Some(now + Duration::minutes(2)),
                    audiences: vec!["https://sp.example.com/metadata".to_string()],
                }),
                authn_instant: Some(now),
                session_index: Some("_session_1".to_string()),
                attributes: vec![Attribute {
                    name: "email".to_string(),
                    values: vec!["test-user@test.com".to_string()],
                }],
            }],
        };
        let parsed = parse_response(&build_response(&response)).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn logout_request_round_trips() {
        let request = LogoutRequest {
            id: message_id("logout"),
            issue_instant: instant(),
            issuer: "https://sp.example.com/metadata".to_string(),
            destination: Some("https://idp.example.com/slo".to_string()),
            name_id: "test-user@test.com".to_string(),
            name_id_format: Some(
                "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent".to_string(),
            ),
            session_index: Some("_session_1".to_string()),
        };
        let parsed = parse_logout_request(&build_logout_request(&request)).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn logout_response_round_trips() {
        let response = LogoutResponse {
            id: message_id("logout_resp"),
            in_response_to: Some("_logout_abc".to_string()),
            issue_instant: instant(),
            issuer: "https://idp.example.com/metadata".to_string(),
            destination: Some("https://sp.example.com/saml/sp/logout/alias/sp".to_string()),
            status: Status::success(),
        };
        let parsed = parse_logout_response(&build_logout_response(&response)).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn logout_dispatch_distinguishes_directions() {
        let response = LogoutResponse {
            id: "_lr_1".to_string(),
            in_response_to: None,
            issue_instant: instant(),
            issuer: "https://idp.example.com/metadata".to_string(),
            destination: None,
            status: Status {
                code: STATUS_SUCCESS.to_string(),
                message: None,
            },
        };
        match parse_logout_message(&build_logout_response(&response)).unwrap() {
            LogoutMessage::Response(r) => assert_eq!(r.id, "_lr_1"),
            LogoutMessage::Request(_) => panic!("dispatched as request"),
        }
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_response("this is not xml"),
            Err(SpError::Malformed(_))
        ));
        assert!(matches!(
            parse_response("<samlp:LogoutRequest/>"),
            Err(SpError::Malformed(_))
        ));
    }

    #[test]
    fn entity_descriptor_yields_endpoints_and_certs() {
        let xml = r#"<?xml version="1.0"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp.example.com/metadata">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data><ds:X509Certificate>MIIBfake
        cert</ds:X509Certificate></ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/slo"/>
    <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.com/sso"/>
  </md:IDPSSODescriptor>
</md:EntityDescriptor>"#;
        let parsed = parse_idp_metadata(xml).unwrap();
        assert_eq!(parsed.entity_id, "https://idp.example.com/metadata");
        assert_eq!(
            parsed.sso_redirect_url.as_deref(),
            Some("https://idp.example.com/sso")
        );
        assert_eq!(
            parsed.slo_redirect_url.as_deref(),
            Some("https://idp.example.com/slo")
        );
        assert_eq!(parsed.certificates, vec!["MIIBfakecert".to_string()]);
    }
}
