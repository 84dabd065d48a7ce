//! The service provider protocol engine.
//!
//! Stateless per message: every operation takes the hosted SP snapshot the
//! request resolved and produces either a browser-facing outcome or an
//! `SpError`. Session and correlation state live behind the injected
//! stores.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::codec::{saml_decode, saml_encode};
use crate::config::RemoteIdpConfig;
use crate::error::SpError;
use crate::metadata::sp_metadata_xml;
use crate::provisioning::HostedSp;
use crate::saml::build::{build_authn_request, build_logout_request, build_logout_response};
use crate::saml::messages::{message_id, Assertion, AuthnRequest, LogoutRequest, LogoutResponse, Response, Status};
use crate::saml::parse::{parse_logout_message, parse_response, LogoutMessage};
use crate::saml::signing;
use crate::session::{
    new_session_id, AuthenticatedSession, RequestTracker, SessionStore,
};

/// Result of consuming a Response on the ACS endpoint.
#[derive(Debug)]
pub struct AcsOutcome {
    /// New session id to set as the `sp_session` cookie.
    pub session_id: String,
    pub redirect_url: String,
    pub principal: String,
}

/// Result of a logout operation.
#[derive(Debug)]
pub struct LogoutOutcome {
    pub redirect_url: String,
    /// Whether the browser session cookie should be cleared now.
    pub clear_session: bool,
}

/// Detached signature parameters as they appeared on the query string,
/// still URL-encoded.
#[derive(Debug, Default, Clone)]
pub struct RedirectSignature {
    pub encoded_message: String,
    pub relay_state: Option<String>,
    pub sig_alg: String,
    pub signature: String,
}

pub struct ServiceProviderService {
    sessions: Arc<dyn SessionStore>,
    tracker: Arc<RequestTracker>,
    clock: Arc<dyn Clock>,
}

impl ServiceProviderService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        tracker: Arc<RequestTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            tracker,
            clock,
        }
    }

    /// Render this SP's metadata document.
    pub fn metadata_xml(&self, sp: &HostedSp) -> Result<String, SpError> {
        sp_metadata_xml(&sp.config, sp.signing.as_ref())
    }

    /// Build the redirect that carries an AuthnRequest to the chosen IdP.
    pub async fn discovery_redirect(
        &self,
        sp: &HostedSp,
        idp_entity_id: &str,
        relay_state: Option<&str>,
    ) -> Result<String, SpError> {
        let idp = sp.providers.remote_provider(idp_entity_id)?;
        let now = self.clock.now();

        let request = AuthnRequest {
            id: message_id("authn"),
            issue_instant: now,
            issuer: sp.config.entity_id.clone(),
            destination: idp.sso_url.clone(),
            assertion_consumer_service_url: sp.config.acs_url(),
            name_id_policy: sp
                .config
                .name_id_formats
                .first()
                .map(|f| f.urn().to_string()),
            force_authn: false,
            is_passive: false,
        };

        self.tracker
            .track(
                request.id.clone(),
                idp.entity_id.clone(),
                relay_state.map(str::to_string),
                now,
            )
            .await;

        tracing::info!(
            request_id = %request.id,
            idp = %idp.entity_id,
            "issuing AuthnRequest"
        );

        self.redirect_url(
            sp,
            &idp.sso_url,
            "SAMLRequest",
            &build_authn_request(&request),
            relay_state,
        )
    }

    /// Consume a Response posted to the ACS endpoint.
    ///
    /// Validation order is fixed: decode, destination, issuer, signature,
    /// time window, audience, correlation, status. The first failing check
    /// names the rejection and later checks never run.
    pub async fn process_response(
        &self,
        sp: &HostedSp,
        encoded: &str,
        relay_state: Option<&str>,
    ) -> Result<AcsOutcome, SpError> {
        // 1. Decode and parse.
        let xml = saml_decode(encoded, false)?;
        let response = parse_response(&xml)?;
        let now = self.clock.now();
        let skew = Duration::seconds(sp.config.response_skew_secs);

        // 2. Destination must equal the receiving endpoint.
        let acs_url = sp.config.acs_url();
        if let Some(destination) = &response.destination {
            if destination != &acs_url {
                return Err(SpError::DestinationMismatch(destination.clone()));
            }
        }

        // 3. Issuer must resolve to a registered provider.
        let idp = sp.providers.remote_provider(&response.issuer)?;

        // 4. Signature.
        self.verify_response_signature(sp, &idp, &xml)?;

        // 5. Time window, with configured skew.
        for assertion in &response.assertions {
            self.check_time_window(assertion, now, skew)?;
        }

        // 6. Audience restriction must include this SP.
        for assertion in &response.assertions {
            if let Some(conditions) = &assertion.conditions {
                if !conditions.audiences.is_empty()
                    && !conditions.audiences.contains(&sp.config.entity_id)
                {
                    return Err(SpError::AudienceMismatch(conditions.audiences.join(", ")));
                }
            }
        }

        // 7. Recipient and InResponseTo correlation.
        let pending_relay_state = self
            .check_correlation(sp, &idp, &response, &acs_url, now)
            .await?;

        // 8. The remote provider must report success.
        if !response.status.is_success() {
            let mut detail = response.status.code.clone();
            if let Some(message) = &response.status.message {
                detail.push_str(": ");
                detail.push_str(message);
            }
            return Err(SpError::RemoteFailure(detail));
        }

        let assertion = response
            .assertions
            .first()
            .ok_or_else(|| SpError::Malformed("Response carries no assertion".to_string()))?;

        let session_id = new_session_id();
        let session = AuthenticatedSession {
            principal: assertion.subject.principal.clone(),
            name_id_format: assertion.subject.name_id_format.clone(),
            sp_entity_id: sp.config.entity_id.clone(),
            idp_entity_id: idp.entity_id.clone(),
            session_index: assertion.session_index.clone(),
            attributes: assertion.attributes.clone(),
            relay_state: relay_state
                .map(str::to_string)
                .or(pending_relay_state),
            authenticated_at: now,
            pending_logout_id: None,
        };

        tracing::info!(
            principal = %session.principal,
            idp = %session.idp_entity_id,
            "sign-on completed"
        );
        self.sessions.insert(session_id.clone(), session).await;

        Ok(AcsOutcome {
            session_id,
            redirect_url: sp.config.post_login_url.clone(),
            principal: assertion.subject.principal.clone(),
        })
    }

    /// SP-initiated logout.
    ///
    /// With an authenticated session and a logout-capable IdP this issues
    /// a LogoutRequest and leaves the session in place until the response
    /// arrives. Otherwise logout completes locally.
    pub async fn initiate_logout(
        &self,
        sp: &HostedSp,
        session_id: Option<&str>,
    ) -> Result<LogoutOutcome, SpError> {
        let Some(session_id) = session_id else {
            return Ok(self.local_logout(sp));
        };
        let Some(mut session) = self.sessions.get(session_id).await else {
            return Ok(self.local_logout(sp));
        };

        let idp = match sp.providers.remote_provider(&session.idp_entity_id) {
            Ok(idp) => idp,
            Err(_) => {
                self.sessions.remove(session_id).await;
                return Ok(self.local_logout(sp));
            }
        };

        let slo_url = match (&idp.slo_url, sp.config.single_logout_enabled) {
            (Some(url), true) => url.clone(),
            _ => {
                self.sessions.remove(session_id).await;
                return Ok(self.local_logout(sp));
            }
        };

        let request = LogoutRequest {
            id: message_id("logout"),
            issue_instant: self.clock.now(),
            issuer: sp.config.entity_id.clone(),
            destination: Some(slo_url.clone()),
            name_id: session.principal.clone(),
            name_id_format: session.name_id_format.clone(),
            session_index: session.session_index.clone(),
        };

        session.pending_logout_id = Some(request.id.clone());
        let relay_state = session.relay_state.clone();
        self.sessions
            .insert(session_id.to_string(), session)
            .await;

        tracing::info!(request_id = %request.id, idp = %idp.entity_id, "initiating single logout");

        let redirect_url = self.redirect_url(
            sp,
            &slo_url,
            "SAMLRequest",
            &build_logout_request(&request),
            relay_state.as_deref(),
        )?;
        Ok(LogoutOutcome {
            redirect_url,
            clear_session: false,
        })
    }

    /// IdP-initiated logout: consume a LogoutRequest, clear the local
    /// session, answer with a LogoutResponse redirect.
    pub async fn process_logout_request(
        &self,
        sp: &HostedSp,
        encoded: &str,
        relay_state: Option<&str>,
        signature: Option<&RedirectSignature>,
        session_id: Option<&str>,
    ) -> Result<LogoutOutcome, SpError> {
        let xml = saml_decode(encoded, true)?;
        let request = match parse_logout_message(&xml)? {
            LogoutMessage::Request(request) => request,
            LogoutMessage::Response(_) => {
                return Err(SpError::Malformed(
                    "expected a LogoutRequest on SAMLRequest".to_string(),
                ));
            }
        };

        let slo_url = sp.config.slo_url();
        if let Some(destination) = &request.destination {
            if destination != &slo_url {
                return Err(SpError::DestinationMismatch(destination.clone()));
            }
        }

        let idp = sp.providers.remote_provider(&request.issuer)?;
        if let Some(sig) = signature {
            signing::verify_redirect_signature(
                "SAMLRequest",
                &sig.encoded_message,
                sig.relay_state.as_deref(),
                &sig.sig_alg,
                &sig.signature,
                &idp.signing_certificates,
            )?;
        }

        if let Some(session_id) = session_id {
            if self.sessions.remove(session_id).await.is_some() {
                tracing::info!(principal = %request.name_id, "session terminated by IdP request");
            }
        }

        let idp_slo = idp.slo_url.clone().ok_or_else(|| {
            SpError::Configuration(format!(
                "provider {} sent a LogoutRequest but has no logout endpoint",
                idp.entity_id
            ))
        })?;

        let response = LogoutResponse {
            id: message_id("logout_resp"),
            in_response_to: Some(request.id.clone()),
            issue_instant: self.clock.now(),
            issuer: sp.config.entity_id.clone(),
            destination: Some(idp_slo.clone()),
            status: Status::success(),
        };

        let redirect_url = self.redirect_url(
            sp,
            &idp_slo,
            "SAMLResponse",
            &build_logout_response(&response),
            relay_state,
        )?;
        Ok(LogoutOutcome {
            redirect_url,
            clear_session: true,
        })
    }

    /// Terminal leg of SP-initiated logout: consume the IdP's
    /// LogoutResponse and finish locally regardless of reported status.
    pub async fn process_logout_response(
        &self,
        sp: &HostedSp,
        encoded: &str,
        session_id: Option<&str>,
    ) -> Result<LogoutOutcome, SpError> {
        let xml = saml_decode(encoded, true)?;
        let response = match parse_logout_message(&xml)? {
            LogoutMessage::Response(response) => response,
            LogoutMessage::Request(_) => {
                return Err(SpError::Malformed(
                    "expected a LogoutResponse on SAMLResponse".to_string(),
                ));
            }
        };

        let slo_url = sp.config.slo_url();
        if let Some(destination) = &response.destination {
            if destination != &slo_url {
                return Err(SpError::DestinationMismatch(destination.clone()));
            }
        }
        sp.providers.remote_provider(&response.issuer)?;

        if let Some(session_id) = session_id {
            if let Some(session) = self.sessions.remove(session_id).await {
                match (&session.pending_logout_id, &response.in_response_to) {
                    (Some(expected), Some(got)) if expected != got => {
                        tracing::warn!(
                            expected = %expected,
                            got = %got,
                            "LogoutResponse InResponseTo does not match the issued request"
                        );
                    }
                    _ => {}
                }
            }
        }

        if !response.status.is_success() {
            tracing::warn!(
                status = %response.status.code,
                issuer = %response.issuer,
                "IdP reported logout failure; local session cleared anyway"
            );
        }

        Ok(LogoutOutcome {
            redirect_url: sp.config.post_logout_url.clone(),
            clear_session: true,
        })
    }

    fn local_logout(&self, sp: &HostedSp) -> LogoutOutcome {
        LogoutOutcome {
            redirect_url: sp.config.post_logout_url.clone(),
            clear_session: true,
        }
    }

    fn verify_response_signature(
        &self,
        sp: &HostedSp,
        idp: &RemoteIdpConfig,
        xml: &str,
    ) -> Result<(), SpError> {
        let required = sp.config.want_assertions_signed || idp.wants_signed_assertions;

        let assertion_start = xml.find("<saml:Assertion");
        let response_signed = match (xml.find("<ds:Signature"), assertion_start) {
            (Some(sig), Some(assertion)) => sig < assertion,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if response_signed {
            return signing::verify_enveloped(xml, &idp.signing_certificates);
        }

        let assertion_fragment = match (assertion_start, xml.find("</saml:Assertion>")) {
            (Some(start), Some(end)) => Some(&xml[start..end + "</saml:Assertion>".len()]),
            _ => None,
        };
        if let Some(fragment) = assertion_fragment {
            if signing::has_enveloped_signature(fragment) {
                return signing::verify_enveloped(fragment, &idp.signing_certificates);
            }
        }

        if required {
            tracing::warn!(issuer = %idp.entity_id, "unsigned response where signatures are required");
            return Err(SpError::SignatureInvalid);
        }
        Ok(())
    }

    fn check_time_window(
        &self,
        assertion: &Assertion,
        now: chrono::DateTime<chrono::Utc>,
        skew: Duration,
    ) -> Result<(), SpError> {
        if let Some(conditions) = &assertion.conditions {
            if let Some(not_before) = conditions.not_before {
                if not_before > now + skew {
                    return Err(SpError::NotYetValid(format!(
                        "assertion not valid before {not_before}"
                    )));
                }
            }
            if let Some(not_on_or_after) = conditions.not_on_or_after {
                if not_on_or_after <= now - skew {
                    return Err(SpError::Expired(format!(
                        "assertion expired at {not_on_or_after}"
                    )));
                }
            }
        }
        if let Some(confirmation) = assertion.subject.confirmation.as_ref() {
            if let Some(not_on_or_after) = confirmation.not_on_or_after {
                if not_on_or_after <= now - skew {
                    return Err(SpError::Expired(format!(
                        "subject confirmation expired at {not_on_or_after}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Recipient and `InResponseTo` checks. Returns the relay state stashed
    /// when the correlated request was issued, if any.
    async fn check_correlation(
        &self,
        sp: &HostedSp,
        idp: &RemoteIdpConfig,
        response: &Response,
        acs_url: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<String>, SpError> {
        for assertion in &response.assertions {
            if let Some(confirmation) = &assertion.subject.confirmation {
                if let Some(recipient) = &confirmation.recipient {
                    if recipient != acs_url {
                        return Err(SpError::CorrelationMismatch(format!(
                            "unexpected Recipient {recipient}"
                        )));
                    }
                }
            }
        }

        let in_response_to = response.in_response_to.as_deref().or_else(|| {
            response
                .assertions
                .first()
                .and_then(|a| a.subject.confirmation.as_ref())
                .and_then(|c| c.in_response_to.as_deref())
        });

        match in_response_to {
            Some(id) => match self.tracker.consume(id, now).await {
                Some(pending) if pending.idp_entity_id == idp.entity_id => {
                    Ok(pending.relay_state)
                }
                Some(_) => Err(SpError::CorrelationMismatch(format!(
                    "request {id} was issued to a different provider"
                ))),
                None if sp.config.strict_correlation => {
                    Err(SpError::CorrelationMismatch(id.to_string()))
                }
                None => Ok(None),
            },
            None if sp.config.strict_correlation => Err(SpError::CorrelationMismatch(
                "missing InResponseTo".to_string(),
            )),
            None => Ok(None),
        }
    }

    /// Assemble a redirect-binding URL, signing the query when the SP is
    /// configured to sign outbound requests.
    fn redirect_url(
        &self,
        sp: &HostedSp,
        endpoint: &str,
        parameter: &str,
        xml: &str,
        relay_state: Option<&str>,
    ) -> Result<String, SpError> {
        let encoded = saml_encode(xml, true)?;
        let query = if sp.config.sign_requests {
            let key = sp.signing.as_ref().ok_or_else(|| {
                SpError::Configuration("request signing enabled without a private key".to_string())
            })?;
            signing::sign_redirect_query(parameter, &encoded, relay_state, key)?
        } else {
            let mut query = format!("{parameter}={}", urlencoding::encode(&encoded));
            if let Some(rs) = relay_state {
                if !rs.is_empty() {
                    query.push_str("&RelayState=");
                    query.push_str(&urlencoding::encode(rs));
                }
            }
            query
        };
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{endpoint}{separator}{query}"))
    }
}
