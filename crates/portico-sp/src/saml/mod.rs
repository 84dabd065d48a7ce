//! SAML 2.0 message model, serialization, parsing and signatures.

pub mod build;
pub mod messages;
pub mod parse;
pub mod signing;

pub use messages::{
    Assertion, Attribute, AuthnRequest, Conditions, LogoutRequest, LogoutResponse, Response,
    Status, Subject, SubjectConfirmation,
};
pub use parse::{from_xml, LogoutMessage, SamlObject};
