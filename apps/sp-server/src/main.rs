//! SAML Service Provider server.
//!
//! Hosts the SP endpoints (metadata, discovery, ACS, single logout) for the
//! providers described by the configuration file named in `SP_CONFIG`.

mod config;
mod logging;

use std::net::SocketAddr;
use std::sync::Arc;

use config::Config;
use portico_sp::clock::SystemClock;
use portico_sp::session::{InMemorySessionStore, RequestTracker};
use portico_sp::{sp_router, Provisioning, ServiceProviderService, SpConfig, SpState};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.log_filter);

    let sp_config = match SpConfig::from_json(&config.sp_config_json) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid SP configuration");
            std::process::exit(1);
        }
    };

    let provisioning = match Provisioning::single(sp_config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::error!(error = %e, "failed to provision service provider");
            std::process::exit(1);
        }
    };

    let service = Arc::new(ServiceProviderService::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(RequestTracker::new()),
        Arc::new(SystemClock),
    ));

    let app = sp_router(SpState {
        provisioning,
        service,
    });

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid listen address");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(%addr, "SP server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
