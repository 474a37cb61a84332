// ── Router session ──
//
// Ties a logged-in `UbusClient` to a `Uci` overlay. rpcd keeps saved but
// unapplied changes per session, so callers that stage changes across
// several processes resume the previous session instead of logging in anew.

use std::future::Future;

use startwrt_api::{Error as ApiError, UbusClient};
use tracing::{debug, info, warn};

use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::uci::Uci;

/// An authenticated connection to one router.
pub struct Router {
    config: RouterConfig,
    uci: Uci<UbusClient>,
}

impl Router {
    /// Build the client and log in with the configured credentials.
    pub async fn connect(config: RouterConfig) -> Result<Self, CoreError> {
        let client = build_client(&config)?;
        login(&client, &config).await?;
        Ok(Self::with_client(config, client))
    }

    /// Reuse an existing rpcd session, logging in again when it expired.
    pub async fn resume(config: RouterConfig, session: &str) -> Result<Self, CoreError> {
        let client = build_client(&config)?;
        client.set_session_id(session);

        match client.access("uci", "*", "read").await {
            Ok(true) => debug!("resumed rpcd session"),
            Ok(false) | Err(ApiError::AccessDenied { .. }) => {
                debug!("cached session expired");
                login(&client, &config).await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Self::with_client(config, client))
    }

    /// Connect, run `f`, and log out again whatever `f` returned.
    pub async fn oneshot<F, Fut, T>(config: RouterConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Uci<UbusClient>) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let router = Self::connect(config).await?;
        let result = f(router.uci()).await;
        router.disconnect().await;
        result
    }

    fn with_client(config: RouterConfig, client: UbusClient) -> Self {
        Self {
            config,
            uci: Uci::new(client),
        }
    }

    /// Handle to the UCI overlay. Clones share state.
    pub fn uci(&self) -> Uci<UbusClient> {
        self.uci.clone()
    }

    pub fn client(&self) -> &UbusClient {
        self.uci.backend()
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn session_id(&self) -> String {
        self.client().session_id()
    }

    /// Leave the rpcd session open and hand back its id for a later
    /// [`resume`](Self::resume).
    pub fn detach(self) -> String {
        self.warn_unsaved();
        self.session_id()
    }

    /// Destroy the rpcd session, dropping everything staged in it.
    pub async fn disconnect(self) {
        self.warn_unsaved();
        if let Err(e) = self.client().logout().await {
            warn!(error = %e, "logout failed (non-fatal)");
        }
    }

    fn warn_unsaved(&self) {
        let unsaved = self.uci.changes();
        if !unsaved.is_empty() {
            warn!(
                configs = ?unsaved.keys().collect::<Vec<_>>(),
                "leaving with unsaved changes"
            );
        }
    }
}

fn build_client(config: &RouterConfig) -> Result<UbusClient, CoreError> {
    let endpoint = config.endpoint().map_err(|e| CoreError::Config {
        message: format!("invalid ubus endpoint: {e}"),
    })?;
    debug!(%endpoint, "connecting to router");
    Ok(UbusClient::new(endpoint, &config.transport())?)
}

async fn login(client: &UbusClient, config: &RouterConfig) -> Result<(), CoreError> {
    let session = client
        .login(&config.credentials.username, &config.credentials.password)
        .await?;
    info!(
        url = %config.url,
        username = %config.credentials.username,
        expires_in = session.timeout,
        "logged in"
    );
    Ok(())
}
