//! Hosted SP resolution.
//!
//! Each request is served against an immutable snapshot of the hosted
//! provider, so every decision within one request sees one consistent
//! configuration. `reload` swaps snapshots atomically; in-flight requests
//! keep the snapshot they started with.

use std::sync::{Arc, RwLock};

use crate::config::SpConfig;
use crate::error::SpError;
use crate::metadata::MetadataStore;
use crate::saml::signing::SigningKey;

/// One hosted service provider, fully resolved from configuration.
pub struct HostedSp {
    pub config: SpConfig,
    /// Present when the active key descriptor carries a private key.
    pub signing: Option<SigningKey>,
    pub providers: MetadataStore,
}

impl HostedSp {
    pub fn from_config(config: SpConfig) -> Result<Self, SpError> {
        config
            .validate()
            .map_err(|e| SpError::Configuration(e.to_string()))?;
        let signing = match &config.keys.active.private_key {
            Some(key_pem) => Some(SigningKey::from_pem(
                &config.keys.active.certificate,
                key_pem,
            )?),
            None => None,
        };
        if signing.is_none() && (config.sign_metadata || config.sign_requests) {
            return Err(SpError::Configuration(
                "signing enabled but the active key has no private key".to_string(),
            ));
        }
        let providers = MetadataStore::from_config(&config);
        Ok(Self {
            config,
            signing,
            providers,
        })
    }

    /// Host part (with port, when explicit) of the configured base URL.
    fn base_host(&self) -> &str {
        let base = &self.config.base_url;
        let after_scheme = base.find("://").map_or(base.as_str(), |p| &base[p + 3..]);
        after_scheme
            .split('/')
            .next()
            .unwrap_or(after_scheme)
    }
}

/// Registry of hosted SPs, resolved per request by `(host, alias)`.
pub struct Provisioning {
    hosted: RwLock<Arc<Vec<Arc<HostedSp>>>>,
}

impl Provisioning {
    pub fn new(configs: Vec<SpConfig>) -> Result<Self, SpError> {
        Ok(Self {
            hosted: RwLock::new(Arc::new(Self::build(configs)?)),
        })
    }

    pub fn single(config: SpConfig) -> Result<Self, SpError> {
        Self::new(vec![config])
    }

    fn build(configs: Vec<SpConfig>) -> Result<Vec<Arc<HostedSp>>, SpError> {
        configs
            .into_iter()
            .map(|c| HostedSp::from_config(c).map(Arc::new))
            .collect()
    }

    /// Replace every hosted SP atomically. Requests already holding a
    /// snapshot are unaffected.
    pub fn reload(&self, configs: Vec<SpConfig>) -> Result<(), SpError> {
        let next = Arc::new(Self::build(configs)?);
        let mut guard = self
            .hosted
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = next;
        Ok(())
    }

    /// Resolve for routes that carry no alias: the SP whose base URL
    /// matches the request host, else the first hosted SP.
    pub fn default_sp(&self, host: Option<&str>) -> Result<Arc<HostedSp>, SpError> {
        let snapshot = self
            .hosted
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        if let Some(host) = host {
            for sp in snapshot.iter() {
                let base_host = sp.base_host();
                if base_host == host || base_host == strip_default_port(host) {
                    return Ok(sp.clone());
                }
            }
        }
        snapshot
            .first()
            .cloned()
            .ok_or_else(|| SpError::UnknownAlias("default".to_string()))
    }

    /// Resolve the hosted SP serving `alias` for the request host.
    ///
    /// An exact host match wins; an alias-only match serves requests
    /// arriving through proxies that rewrite the Host header.
    pub fn resolve(&self, host: Option<&str>, alias: &str) -> Result<Arc<HostedSp>, SpError> {
        let snapshot = self
            .hosted
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        let mut alias_match = None;
        for sp in snapshot.iter() {
            if sp.config.alias != alias {
                continue;
            }
            if let Some(host) = host {
                let base_host = sp.base_host();
                if base_host == host || base_host == strip_default_port(host) {
                    return Ok(sp.clone());
                }
            }
            alias_match.get_or_insert_with(|| sp.clone());
        }
        alias_match.ok_or_else(|| SpError::UnknownAlias(alias.to_string()))
    }
}

fn strip_default_port(host: &str) -> &str {
    host.strip_suffix(":80")
        .or_else(|| host.strip_suffix(":443"))
        .unwrap_or(host)
}
