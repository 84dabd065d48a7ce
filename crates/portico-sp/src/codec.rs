//! Wire codec for the HTTP-Redirect and HTTP-POST bindings.
//!
//! Redirect binding: raw deflate, then base64 (percent-encoding happens at
//! URL assembly time). POST binding: base64 only.

use crate::error::{SpError, SpResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Maximum decompressed size (64 KB) to prevent deflate bomb DoS
const MAX_DECOMPRESSED_SIZE: u64 = 64 * 1024;

/// Maximum encoded size for the redirect binding (128 KB)
const MAX_ENCODED_SIZE_REDIRECT: usize = 128 * 1024;

/// Maximum encoded size for the POST binding (512 KB)
const MAX_ENCODED_SIZE_POST: usize = 512 * 1024;

/// Encode XML for transmission.
///
/// `deflate=true` for the redirect binding, `false` for the POST binding.
pub fn saml_encode(xml: &str, deflate: bool) -> SpResult<String> {
    if deflate {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(xml.as_bytes())
            .and_then(|()| encoder.finish())
            .map(|compressed| STANDARD.encode(compressed))
            .map_err(|e| SpError::Malformed(format!("Deflate encode failed: {e}")))
    } else {
        Ok(STANDARD.encode(xml.as_bytes()))
    }
}

/// Decode a received `SAMLRequest`/`SAMLResponse` parameter back to XML.
pub fn saml_decode(encoded: &str, deflate: bool) -> SpResult<String> {
    let limit = if deflate {
        MAX_ENCODED_SIZE_REDIRECT
    } else {
        MAX_ENCODED_SIZE_POST
    };
    // Reject oversized input before base64 decode to prevent OOM.
    if encoded.len() > limit {
        return Err(SpError::Malformed(format!(
            "Encoded message exceeds maximum size ({} > {limit} bytes)",
            encoded.len()
        )));
    }

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| SpError::Malformed(format!("Base64 decode failed: {e}")))?;

    if !deflate {
        return String::from_utf8(decoded)
            .map_err(|e| SpError::Malformed(format!("Invalid UTF-8: {e}")));
    }

    let decoder = DeflateDecoder::new(&decoded[..]);
    let mut xml = String::new();
    decoder
        .take(MAX_DECOMPRESSED_SIZE)
        .read_to_string(&mut xml)
        .map_err(|e| SpError::Malformed(format!("Deflate decode failed: {e}")))?;

    if xml.len() as u64 >= MAX_DECOMPRESSED_SIZE {
        return Err(SpError::Malformed(
            "Decompressed message exceeds maximum size limit (64 KB)".to_string(),
        ));
    }

    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?><samlp:AuthnRequest ID="_a"/>"#;

    #[test]
    fn redirect_binding_round_trip() {
        let encoded = saml_encode(SAMPLE, true).unwrap();
        assert_eq!(saml_decode(&encoded, true).unwrap(), SAMPLE);
    }

    #[test]
    fn post_binding_round_trip() {
        let encoded = saml_encode(SAMPLE, false).unwrap();
        assert_eq!(saml_decode(&encoded, false).unwrap(), SAMPLE);
    }

    #[test]
    fn bindings_are_not_interchangeable() {
        let encoded = saml_encode(SAMPLE, false).unwrap();
        assert!(saml_decode(&encoded, true).is_err());
    }

    #[test]
    fn invalid_base64_is_malformed() {
        let err = saml_decode("not!!base64", false).unwrap_err();
        assert!(err.to_string().contains("Base64 decode failed"));
    }

    #[test]
    fn oversized_redirect_input_is_rejected_before_decode() {
        let huge = "A".repeat(MAX_ENCODED_SIZE_REDIRECT + 1);
        let err = saml_decode(&huge, true).unwrap_err();
        assert!(err.to_string().contains("maximum size"));
    }
}
