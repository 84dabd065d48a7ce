//! XML signature production and verification.
//!
//! Enveloped signatures use exclusive C14N with RSA-SHA256 digests and are
//! inserted after the Issuer element (or after the root open tag for
//! documents without one, such as metadata). Redirect-binding signatures
//! are detached and cover the query string `SAMLRequest=..&RelayState=..
//! &SigAlg=..` in URL-encoded form.
//!
//! Verification failures carry no cryptographic detail outward. The detail
//! is logged here and the caller sees only `SpError::SignatureInvalid`.

use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;
use xml_canonicalization::Canonicalizer;

use crate::error::SpError;

pub const SIG_ALG_RSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// An RSA keypair with its certificate, ready to sign.
pub struct SigningKey {
    private_key: PKey<Private>,
    certificate_der_b64: String,
}

impl SigningKey {
    /// Load from PEM-encoded certificate and private key.
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> Result<Self, SpError> {
        let certificate = parse_certificate(certificate_pem)
            .map_err(|e| SpError::Configuration(format!("invalid certificate: {e}")))?;
        let private_key = PKey::private_key_from_pem(private_key_pem.as_bytes())
            .map_err(|e| SpError::Configuration(format!("invalid private key: {e}")))?;
        let der = certificate
            .to_der()
            .map_err(|e| SpError::Configuration(format!("certificate DER encoding: {e}")))?;
        Ok(Self {
            private_key,
            certificate_der_b64: STANDARD.encode(der),
        })
    }

    /// RSA-SHA256 over raw bytes.
    pub fn sign_sha256(&self, data: &[u8]) -> Result<Vec<u8>, SpError> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.private_key)
            .map_err(|e| SpError::Configuration(format!("signer creation failed: {e}")))?;
        signer
            .update(data)
            .map_err(|e| SpError::Configuration(format!("signing failed: {e}")))?;
        signer
            .sign_to_vec()
            .map_err(|e| SpError::Configuration(format!("signing failed: {e}")))
    }

    /// Base64 DER certificate for `<ds:X509Certificate>` and metadata.
    #[must_use]
    pub fn certificate_base64_der(&self) -> &str {
        &self.certificate_der_b64
    }
}

/// Parse an X.509 certificate from PEM, or from bare base64 DER as it
/// appears inside metadata documents.
pub fn parse_certificate(value: &str) -> Result<X509, String> {
    let pem_data = if value.contains("-----BEGIN CERTIFICATE-----") {
        value.to_string()
    } else {
        format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----",
            value.trim()
        )
    };
    X509::from_pem(pem_data.as_bytes()).map_err(|e| format!("invalid certificate: {e}"))
}

/// Apply exclusive XML canonicalization without comments.
fn canonicalize_xml(xml: &str) -> Result<String, String> {
    let mut output = Vec::new();
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| format!("canonicalization failed: {e}"))?;
    String::from_utf8(output).map_err(|e| format!("invalid UTF-8: {e}"))
}

/// Insert an enveloped signature into `xml`.
///
/// The digest reference covers the element carrying `element_id` with the
/// enveloped-signature transform applied. The signature lands after
/// `</saml:Issuer>` when present, otherwise directly after the root open
/// tag.
pub fn sign_enveloped(xml: &str, element_id: &str, key: &SigningKey) -> Result<String, SpError> {
    let insert_at = match xml.find("</saml:Issuer>") {
        Some(pos) => pos + "</saml:Issuer>".len(),
        None => {
            let root_start = xml
                .find('<')
                .map(|p| if xml[p..].starts_with("<?") {
                    xml[p + 1..].find('<').map(|q| p + 1 + q)
                } else {
                    Some(p)
                })
                .flatten()
                .ok_or_else(|| SpError::Configuration("no root element to sign".to_string()))?;
            xml[root_start..]
                .find('>')
                .map(|p| root_start + p + 1)
                .ok_or_else(|| SpError::Configuration("unterminated root open tag".to_string()))?
        }
    };

    // Digest over the canonicalized document without the signature, which
    // at this point is the document as given.
    let root_start = xml
        .find("<samlp:")
        .or_else(|| xml.find("<md:"))
        .or_else(|| xml.find("<saml:"))
        .ok_or_else(|| SpError::Configuration("no root element to sign".to_string()))?;
    let canonicalized =
        canonicalize_xml(&xml[root_start..]).map_err(SpError::Configuration)?;
    let digest = openssl::hash::hash(MessageDigest::sha256(), canonicalized.as_bytes())
        .map_err(|e| SpError::Configuration(format!("digest failed: {e}")))?;
    let digest_b64 = STANDARD.encode(digest);

    let mut signed_info = String::new();
    signed_info.push_str("<ds:SignedInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">");
    signed_info.push_str(
        "<ds:CanonicalizationMethod Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/>",
    );
    signed_info.push_str(
        "<ds:SignatureMethod Algorithm=\"http://www.w3.org/2001/04/xmldsig-more#rsa-sha256\"/>",
    );
    signed_info.push_str("<ds:Reference URI=\"#");
    signed_info.push_str(element_id);
    signed_info.push_str("\">");
    signed_info.push_str("<ds:Transforms>");
    signed_info.push_str(
        "<ds:Transform Algorithm=\"http://www.w3.org/2000/09/xmldsig#enveloped-signature\"/>",
    );
    signed_info.push_str("<ds:Transform Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/>");
    signed_info.push_str("</ds:Transforms>");
    signed_info
        .push_str("<ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>");
    signed_info.push_str("<ds:DigestValue>");
    signed_info.push_str(&digest_b64);
    signed_info.push_str("</ds:DigestValue>");
    signed_info.push_str("</ds:Reference>");
    signed_info.push_str("</ds:SignedInfo>");

    let canonicalized_signed_info =
        canonicalize_xml(&signed_info).map_err(SpError::Configuration)?;
    let signature = key.sign_sha256(canonicalized_signed_info.as_bytes())?;
    let signature_b64 = STANDARD.encode(&signature);

    // No whitespace inside the signature element, the digest would not
    // survive re-canonicalization otherwise.
    let mut sig_xml = String::new();
    sig_xml.push_str("<ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">");
    sig_xml.push_str(&signed_info);
    sig_xml.push_str("<ds:SignatureValue>");
    sig_xml.push_str(&signature_b64);
    sig_xml.push_str("</ds:SignatureValue><ds:KeyInfo><ds:X509Data><ds:X509Certificate>");
    sig_xml.push_str(key.certificate_base64_der());
    sig_xml.push_str("</ds:X509Certificate></ds:X509Data></ds:KeyInfo></ds:Signature>");

    let mut result = String::with_capacity(xml.len() + sig_xml.len());
    result.push_str(&xml[..insert_at]);
    result.push_str(&sig_xml);
    result.push_str(&xml[insert_at..]);
    Ok(result)
}

/// Whether the document carries an enveloped `ds:Signature`.
#[must_use]
pub fn has_enveloped_signature(xml: &str) -> bool {
    xml.contains("<ds:Signature") || xml.contains("<Signature")
}

/// Verify an enveloped signature against any of the trusted certificates.
///
/// Checks the reference digest first, then the SignedInfo signature. Any
/// trusted certificate validating the signature is sufficient.
pub fn verify_enveloped(xml: &str, trusted_certificates: &[String]) -> Result<(), SpError> {
    let result = verify_enveloped_inner(xml, trusted_certificates);
    if let Err(detail) = &result {
        tracing::warn!(detail = %detail, "XML signature verification failed");
    }
    result.map_err(|_| SpError::SignatureInvalid)
}

fn verify_enveloped_inner(xml: &str, trusted_certificates: &[String]) -> Result<(), String> {
    let sig_info = extract_signature_info(xml)?;
    verify_reference_digest(xml, &sig_info)?;

    let canonicalized_signed_info = canonicalize_xml(&sig_info.signed_info)?;
    let signature_bytes = STANDARD
        .decode(sig_info.signature_value.replace(['\n', '\r', ' '], ""))
        .map_err(|e| format!("invalid signature encoding: {e}"))?;

    let mut last_error = "no trusted certificates configured".to_string();
    for certificate in trusted_certificates {
        let cert = parse_certificate(certificate)?;
        let public_key = cert
            .public_key()
            .map_err(|e| format!("invalid certificate: {e}"))?;
        let mut verifier = Verifier::new(MessageDigest::sha256(), &public_key)
            .map_err(|e| format!("verifier creation failed: {e}"))?;
        verifier
            .update(canonicalized_signed_info.as_bytes())
            .map_err(|e| format!("signature update failed: {e}"))?;
        match verifier.verify(&signature_bytes) {
            Ok(true) => return Ok(()),
            Ok(false) => last_error = "signature does not match any trusted key".to_string(),
            Err(e) => last_error = format!("signature verification failed: {e}"),
        }
    }
    Err(last_error)
}

struct SignatureInfo {
    signed_info: String,
    signature_value: String,
    digest_value: String,
}

/// Extract SignedInfo (verbatim, whitespace preserved), SignatureValue and
/// DigestValue from a signed document.
fn extract_signature_info(xml: &str) -> Result<SignatureInfo, String> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);

    let mut in_signed_info = false;
    let mut in_signature_value = false;
    let mut in_digest_value = false;
    let mut signed_info = String::new();
    let mut signature_value = String::new();
    let mut digest_value = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "SignedInfo" {
                    in_signed_info = true;
                    signed_info.push('<');
                    signed_info.push_str(&String::from_utf8_lossy(&e));
                    signed_info.push('>');
                } else if in_signed_info {
                    signed_info.push('<');
                    signed_info.push_str(&String::from_utf8_lossy(&e));
                    signed_info.push('>');
                } else if name == "SignatureValue" {
                    in_signature_value = true;
                } else if name == "DigestValue" {
                    in_digest_value = true;
                }
            }
            Ok(Event::Empty(e)) => {
                if in_signed_info {
                    signed_info.push('<');
                    signed_info.push_str(&String::from_utf8_lossy(&e));
                    signed_info.push_str("/>");
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "SignedInfo" && in_signed_info {
                    signed_info.push_str("</");
                    signed_info.push_str(&String::from_utf8_lossy(e.name().as_ref()));
                    signed_info.push('>');
                    in_signed_info = false;
                } else if in_signed_info {
                    signed_info.push_str("</");
                    signed_info.push_str(&String::from_utf8_lossy(e.name().as_ref()));
                    signed_info.push('>');
                } else if name == "SignatureValue" {
                    in_signature_value = false;
                } else if name == "DigestValue" {
                    in_digest_value = false;
                }
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default();
                if in_signed_info {
                    signed_info.push_str(&text);
                } else if in_signature_value {
                    signature_value.push_str(&text);
                } else if in_digest_value {
                    digest_value.push_str(&text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {e}")),
            _ => {}
        }
    }

    if signed_info.is_empty() {
        return Err("no SignedInfo element found".to_string());
    }
    if signature_value.is_empty() {
        return Err("no SignatureValue element found".to_string());
    }

    Ok(SignatureInfo {
        signed_info,
        signature_value,
        digest_value,
    })
}

/// Recompute the reference digest over the document with the signature
/// element removed (enveloped transform) and compare.
fn verify_reference_digest(xml: &str, sig_info: &SignatureInfo) -> Result<(), String> {
    let without_signature = remove_signature_element(xml);
    let root_start = without_signature
        .find("<samlp:")
        .or_else(|| without_signature.find("<md:"))
        .or_else(|| without_signature.find("<saml:"))
        .unwrap_or(0);
    let canonicalized = canonicalize_xml(&without_signature[root_start..])?;
    let digest = openssl::hash::hash(MessageDigest::sha256(), canonicalized.as_bytes())
        .map_err(|e| format!("hash failed: {e}"))?;
    let computed = STANDARD.encode(digest);

    let expected = sig_info.digest_value.replace(['\n', '\r', ' '], "");
    if computed != expected {
        return Err("digest mismatch".to_string());
    }
    Ok(())
}

fn remove_signature_element(xml: &str) -> String {
    for (open, close) in [
        ("<ds:Signature", "</ds:Signature>"),
        ("<Signature", "</Signature>"),
    ] {
        if let (Some(start), Some(end)) = (xml.find(open), xml.find(close)) {
            let mut result = String::with_capacity(xml.len());
            result.push_str(&xml[..start]);
            result.push_str(&xml[end + close.len()..]);
            return result;
        }
    }
    xml.to_string()
}

/// Build the redirect-binding query string and its detached signature.
///
/// `message` and `relay_state` arrive raw and leave URL-encoded inside the
/// returned query string, with `Signature=` appended last.
pub fn sign_redirect_query(
    parameter: &str,
    encoded_message: &str,
    relay_state: Option<&str>,
    key: &SigningKey,
) -> Result<String, SpError> {
    let mut query = format!("{parameter}={}", urlencoding::encode(encoded_message));
    if let Some(rs) = relay_state {
        if !rs.is_empty() {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
    }
    query.push_str("&SigAlg=");
    query.push_str(&urlencoding::encode(SIG_ALG_RSA_SHA256));

    let signature = key.sign_sha256(query.as_bytes())?;
    query.push_str("&Signature=");
    query.push_str(&urlencoding::encode(&STANDARD.encode(signature)));
    Ok(query)
}

/// Verify a detached redirect-binding signature.
///
/// Parameter values must be passed exactly as they appeared in the query
/// string (still URL-encoded); the signed data is reconstructed in
/// protocol order.
pub fn verify_redirect_signature(
    parameter: &str,
    encoded_message: &str,
    relay_state: Option<&str>,
    sig_alg: &str,
    signature: &str,
    trusted_certificates: &[String],
) -> Result<(), SpError> {
    let result = verify_redirect_signature_inner(
        parameter,
        encoded_message,
        relay_state,
        sig_alg,
        signature,
        trusted_certificates,
    );
    if let Err(detail) = &result {
        tracing::warn!(detail = %detail, "redirect signature verification failed");
    }
    result.map_err(|_| SpError::SignatureInvalid)
}

fn verify_redirect_signature_inner(
    parameter: &str,
    encoded_message: &str,
    relay_state: Option<&str>,
    sig_alg: &str,
    signature: &str,
    trusted_certificates: &[String],
) -> Result<(), String> {
    let mut signed_data = format!("{parameter}={encoded_message}");
    if let Some(rs) = relay_state {
        if !rs.is_empty() {
            signed_data.push_str("&RelayState=");
            signed_data.push_str(rs);
        }
    }
    signed_data.push_str("&SigAlg=");
    signed_data.push_str(sig_alg);

    let signature_bytes = urlencoding::decode(signature)
        .map_err(|e| format!("invalid Signature encoding: {e}"))
        .and_then(|s| {
            STANDARD
                .decode(s.as_ref())
                .map_err(|e| format!("invalid signature base64: {e}"))
        })?;

    let digest = match urlencoding::decode(sig_alg)
        .map_err(|e| format!("invalid SigAlg encoding: {e}"))?
        .as_ref()
    {
        "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => MessageDigest::sha256(),
        "http://www.w3.org/2000/09/xmldsig#rsa-sha1" => MessageDigest::sha1(),
        "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => MessageDigest::sha384(),
        "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => MessageDigest::sha512(),
        alg => return Err(format!("unsupported signature algorithm: {alg}")),
    };

    let mut last_error = "no trusted certificates configured".to_string();
    for certificate in trusted_certificates {
        let cert = parse_certificate(certificate)?;
        let public_key = cert
            .public_key()
            .map_err(|e| format!("invalid certificate: {e}"))?;
        let mut verifier = Verifier::new(digest, &public_key)
            .map_err(|e| format!("verifier creation failed: {e}"))?;
        verifier
            .update(signed_data.as_bytes())
            .map_err(|e| format!("signature update failed: {e}"))?;
        match verifier.verify(&signature_bytes) {
            Ok(true) => return Ok(()),
            Ok(false) => last_error = "signature does not match any trusted key".to_string(),
            Err(e) => last_error = format!("signature verification failed: {e}"),
        }
    }
    Err(last_error)
}
