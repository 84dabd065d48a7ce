//! Outbound SAML XML serialization.
//!
//! Messages are concatenated rather than templated so every interpolated
//! value goes through `xml_escape` exactly once.

use super::messages::{
    format_instant, Assertion, AuthnRequest, LogoutRequest, LogoutResponse, Response,
    SUBJECT_CONFIRMATION_BEARER,
};

/// Serialize an `AuthnRequest` for the redirect binding.
#[must_use]
pub fn build_authn_request(request: &AuthnRequest) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<samlp:AuthnRequest xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\"\n");
    xml.push_str("    xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"\n");
    xml.push_str("    ID=\"");
    xml.push_str(&xml_escape(&request.id));
    xml.push_str("\"\n    Version=\"2.0\"\n    IssueInstant=\"");
    xml.push_str(&format_instant(request.issue_instant));
    xml.push_str("\"\n    Destination=\"");
    xml.push_str(&xml_escape(&request.destination));
    xml.push_str("\"\n    AssertionConsumerServiceURL=\"");
    xml.push_str(&xml_escape(&request.assertion_consumer_service_url));
    xml.push_str("\"\n    ProtocolBinding=\"urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST\"");
    if request.force_authn {
        xml.push_str(" ForceAuthn=\"true\"");
    }
    if request.is_passive {
        xml.push_str(" IsPassive=\"true\"");
    }
    xml.push_str(">\n    <saml:Issuer>");
    xml.push_str(&xml_escape(&request.issuer));
    xml.push_str("</saml:Issuer>\n");
    if let Some(format) = &request.name_id_policy {
        xml.push_str("    <samlp:NameIDPolicy Format=\"");
        xml.push_str(&xml_escape(format));
        xml.push_str("\" AllowCreate=\"true\"/>\n");
    }
    xml.push_str("</samlp:AuthnRequest>");
    xml
}

/// Serialize a `LogoutRequest`.
#[must_use]
pub fn build_logout_request(request: &LogoutRequest) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<samlp:LogoutRequest xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\"\n");
    xml.push_str("    xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"\n");
    xml.push_str("    ID=\"");
    xml.push_str(&xml_escape(&request.id));
    xml.push_str("\"\n    Version=\"2.0\"\n    IssueInstant=\"");
    xml.push_str(&format_instant(request.issue_instant));
    xml.push('"');
    if let Some(destination) = &request.destination {
        xml.push_str("\n    Destination=\"");
        xml.push_str(&xml_escape(destination));
        xml.push('"');
    }
    xml.push_str(">\n    <saml:Issuer>");
    xml.push_str(&xml_escape(&request.issuer));
    xml.push_str("</saml:Issuer>\n    <saml:NameID");
    if let Some(format) = &request.name_id_format {
        xml.push_str(" Format=\"");
        xml.push_str(&xml_escape(format));
        xml.push('"');
    }
    xml.push('>');
    xml.push_str(&xml_escape(&request.name_id));
    xml.push_str("</saml:NameID>\n");
    if let Some(index) = &request.session_index {
        xml.push_str("    <samlp:SessionIndex>");
        xml.push_str(&xml_escape(index));
        xml.push_str("</samlp:SessionIndex>\n");
    }
    xml.push_str("</samlp:LogoutRequest>");
    xml
}

/// Serialize a `LogoutResponse`.
#[must_use]
pub fn build_logout_response(response: &LogoutResponse) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<samlp:LogoutResponse xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\"\n");
    xml.push_str("    xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"\n");
    xml.push_str("    ID=\"");
    xml.push_str(&xml_escape(&response.id));
    xml.push_str("\"\n    Version=\"2.0\"\n    IssueInstant=\"");
    xml.push_str(&format_instant(response.issue_instant));
    xml.push('"');
    if let Some(destination) = &response.destination {
        xml.push_str("\n    Destination=\"");
        xml.push_str(&xml_escape(destination));
        xml.push('"');
    }
    if let Some(in_response_to) = &response.in_response_to {
        xml.push_str("\n    InResponseTo=\"");
        xml.push_str(&xml_escape(in_response_to));
        xml.push('"');
    }
    xml.push_str(">\n    <saml:Issuer>");
    xml.push_str(&xml_escape(&response.issuer));
    xml.push_str("</saml:Issuer>\n    <samlp:Status>\n        <samlp:StatusCode Value=\"");
    xml.push_str(&xml_escape(&response.status.code));
    xml.push_str("\"/>\n");
    if let Some(message) = &response.status.message {
        xml.push_str("        <samlp:StatusMessage>");
        xml.push_str(&xml_escape(message));
        xml.push_str("</samlp:StatusMessage>\n");
    }
    xml.push_str("    </samlp:Status>\n</samlp:LogoutResponse>");
    xml
}

/// Serialize a `Response` with its assertions.
///
/// The SP itself never emits responses; this exists for the round-trip
/// contract of the codec and for peers simulated in tests.
#[must_use]
pub fn build_response(response: &Response) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<samlp:Response xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\"\n");
    xml.push_str("    xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"\n");
    xml.push_str("    ID=\"");
    xml.push_str(&xml_escape(&response.id));
    xml.push_str("\"\n    Version=\"2.0\"\n    IssueInstant=\"");
    xml.push_str(&format_instant(response.issue_instant));
    xml.push('"');
    if let Some(destination) = &response.destination {
        xml.push_str("\n    Destination=\"");
        xml.push_str(&xml_escape(destination));
        xml.push('"');
    }
    if let Some(in_response_to) = &response.in_response_to {
        xml.push_str("\n    InResponseTo=\"");
        xml.push_str(&xml_escape(in_response_to));
        xml.push('"');
    }
    xml.push_str(">\n    <saml:Issuer>");
    xml.push_str(&xml_escape(&response.issuer));
    xml.push_str("</saml:Issuer>\n    <samlp:Status>\n        <samlp:StatusCode Value=\"");
    xml.push_str(&xml_escape(&response.status.code));
    xml.push_str("\"/>\n    </samlp:Status>\n");
    for assertion in &response.assertions {
        xml.push_str(&build_assertion(assertion));
    }
    xml.push_str("</samlp:Response>");
    xml
}

fn build_assertion(assertion: &Assertion) -> String {
    let mut xml = String::new();
    xml.push_str(
        "    <saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"\n        ID=\"",
    );
    xml.push_str(&xml_escape(&assertion.id));
    xml.push_str("\"\n        Version=\"2.0\"\n        IssueInstant=\"");
    xml.push_str(&format_instant(assertion.issue_instant));
    xml.push_str("\">\n        <saml:Issuer>");
    xml.push_str(&xml_escape(&assertion.issuer));
    xml.push_str("</saml:Issuer>\n        <saml:Subject>\n            <saml:NameID");
    if let Some(format) = &assertion.subject.name_id_format {
        xml.push_str(" Format=\"");
        xml.push_str(&xml_escape(format));
        xml.push('"');
    }
    xml.push('>');
    xml.push_str(&xml_escape(&assertion.subject.principal));
    xml.push_str("</saml:NameID>\n");
    if let Some(confirmation) = &assertion.subject.confirmation {
        xml.push_str("            <saml:SubjectConfirmation Method=\"");
        xml.push_str(SUBJECT_CONFIRMATION_BEARER);
        xml.push_str("\">\n                <saml:SubjectConfirmationData");
        if let Some(not_on_or_after) = confirmation.not_on_or_after {
            xml.push_str(" NotOnOrAfter=\"");
            xml.push_str(&format_instant(not_on_or_after));
            xml.push('"');
        }
        if let Some(recipient) = &confirmation.recipient {
            xml.push_str(" Recipient=\"");
            xml.push_str(&xml_escape(recipient));
            xml.push('"');
        }
        if let Some(in_response_to) = &confirmation.in_response_to {
            xml.push_str(" InResponseTo=\"");
            xml.push_str(&xml_escape(in_response_to));
            xml.push('"');
        }
        xml.push_str("/>\n            </saml:SubjectConfirmation>\n");
    }
    xml.push_str("        </saml:Subject>\n");
    if let Some(conditions) = &assertion.conditions {
        xml.push_str("        <saml:Conditions");
        if let Some(not_before) = conditions.not_before {
            xml.push_str(" NotBefore=\"");
            xml.push_str(&format_instant(not_before));
            xml.push('"');
        }
        if let Some(not_on_or_after) = conditions.not_on_or_after {
            xml.push_str(" NotOnOrAfter=\"");
            xml.push_str(&format_instant(not_on_or_after));
            xml.push('"');
        }
        xml.push_str(">\n            <saml:AudienceRestriction>\n");
        for audience in &conditions.audiences {
            xml.push_str("                <saml:Audience>");
            xml.push_str(&xml_escape(audience));
            xml.push_str("</saml:Audience>\n");
        }
        xml.push_str("            </saml:AudienceRestriction>\n        </saml:Conditions>\n");
    }
    if let Some(authn_instant) = assertion.authn_instant {
        xml.push_str("        <saml:AuthnStatement AuthnInstant=\"");
        xml.push_str(&format_instant(authn_instant));
        xml.push('"');
        if let Some(index) = &assertion.session_index {
            xml.push_str(" SessionIndex=\"");
            xml.push_str(&xml_escape(index));
            xml.push('"');
        }
        xml.push_str(">\n            <saml:AuthnContext>\n                <saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef>\n            </saml:AuthnContext>\n        </saml:AuthnStatement>\n");
    }
    if !assertion.attributes.is_empty() {
        xml.push_str("        <saml:AttributeStatement>\n");
        for attribute in &assertion.attributes {
            xml.push_str("            <saml:Attribute Name=\"");
            xml.push_str(&xml_escape(&attribute.name));
            xml.push_str("\">\n");
            for value in &attribute.values {
                xml.push_str("                <saml:AttributeValue>");
                xml.push_str(&xml_escape(value));
                xml.push_str("</saml:AttributeValue>\n");
            }
            xml.push_str("            </saml:Attribute>\n");
        }
        xml.push_str("        </saml:AttributeStatement>\n");
    }
    xml.push_str("    </saml:Assertion>\n");
    xml
}

/// XML escape special characters
#[must_use]
pub fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_covers_the_five_predefined_entities() {
        assert_eq!(xml_escape("<a & \"b\"'>"), "&lt;a &amp; &quot;b&quot;&apos;&gt;");
    }

    #[test]
    fn authn_request_carries_destination_and_acs() {
        let request = AuthnRequest {
            id: "_authn_1".to_string(),
            issue_instant: chrono::Utc::now(),
            issuer: "https://sp.example.com".to_string(),
            destination: "https://idp.example.com/sso".to_string(),
            assertion_consumer_service_url: "https://sp.example.com/saml/sp/SSO/alias/sp"
                .to_string(),
            name_id_policy: Some(
                "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent".to_string(),
            ),
            force_authn: false,
            is_passive: false,
        };
        let xml = build_authn_request(&request);
        assert!(xml.contains("Destination=\"https://idp.example.com/sso\""));
        assert!(xml.contains("AssertionConsumerServiceURL="));
        assert!(xml.contains("<samlp:NameIDPolicy"));
        assert!(!xml.contains("ForceAuthn"));
    }
}
