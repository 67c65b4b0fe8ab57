//! Application state.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::dispatcher::{AccessTable, Authorizer};
use crate::ipn::NotificationProcessor;
use crate::paypal::{NotificationVerifier, PaypalVerifier};
use crate::servers::ServerRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: ServiceConfig,

    /// Registered game server groups.
    pub servers: Arc<ServerRegistry>,

    /// PayPal notification processor.
    pub processor: Arc<NotificationProcessor>,

    /// Route authorization for the dispatcher.
    pub access: Arc<dyn Authorizer>,
}

impl AppState {
    /// Create a new application state around an explicit verifier.
    #[must_use]
    pub fn new(
        config: ServiceConfig,
        servers: ServerRegistry,
        verifier: Arc<dyn NotificationVerifier>,
    ) -> Self {
        let servers = Arc::new(servers);
        let processor = Arc::new(NotificationProcessor::new(
            config.processor_settings(),
            Arc::clone(&servers),
            verifier,
        ));
        let access: Arc<dyn Authorizer> = Arc::new(AccessTable::new(config.access_rules.clone()));

        if servers.is_empty() {
            tracing::warn!("No server groups registered - donations will not be audited");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not configured - admin endpoints are disabled");
        }
        if config.session_secret.is_none() {
            tracing::warn!("SESSION_SECRET not configured - every visitor is a guest");
        }

        Self {
            config,
            servers,
            processor,
            access,
        }
    }

    /// Create the application state with the PayPal HTTP verifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_paypal(config: ServiceConfig, servers: ServerRegistry) -> Result<Self, reqwest::Error> {
        let verifier = PaypalVerifier::new(&config.paypal_ipn_host, config.verify_timeout())?;
        tracing::info!(endpoint = %verifier.endpoint(), "PayPal verification enabled");

        Ok(Self::new(config, servers, Arc::new(verifier)))
    }
}
