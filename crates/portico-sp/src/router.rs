//! SP route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    discovery::discovery, metadata::sp_metadata, select::select_idp, slo::single_logout,
    sso::assertion_consumer, SpState,
};

/// All SP endpoints under the `/saml/sp` prefix.
pub fn sp_router(state: SpState) -> Router {
    Router::new()
        .route("/saml/sp/metadata", get(sp_metadata))
        .route("/saml/sp/select", get(select_idp))
        .route("/saml/sp/discovery/alias/:alias", get(discovery))
        .route("/saml/sp/SSO/alias/:alias", post(assertion_consumer))
        .route("/saml/sp/logout/alias/:alias", get(single_logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
