//! SAML 2.0 Service Provider.
//!
//! Implements the HTTP-facing contract of a SAML SP: metadata publication,
//! IdP discovery with AuthnRequest initiation over the redirect binding,
//! Response consumption on the POST binding, and single logout in both the
//! initiator and responder roles.

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metadata;
pub mod provisioning;
pub mod router;
pub mod saml;
pub mod service;
pub mod session;

pub use config::SpConfig;
pub use error::{SpError, SpResult};
pub use handlers::SpState;
pub use provisioning::{HostedSp, Provisioning};
pub use router::sp_router;
pub use service::ServiceProviderService;
