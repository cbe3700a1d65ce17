use std::sync::Arc;

use vpnbot_core::{
    backend::BackendApi,
    config::{Config, SESSION_REFRESH_INTERVAL},
    session::{SessionAuthenticator, SessionRefresher},
};
use vpnbot_shm::BackendSession;

#[tokio::main]
async fn main() -> Result<(), vpnbot_core::Error> {
    vpnbot_core::logging::init("vpnbot")?;

    let cfg = Arc::new(Config::load()?);

    let backend = Arc::new(BackendSession::from_config(&cfg)?);
    if let Err(e) = backend.authenticate().await {
        tracing::error!(error = %e, "initial backend authentication failed");
        return Err(e);
    }
    tracing::info!(base_url = %cfg.api.base_url, "backend session established");

    let refresher = SessionRefresher::new(backend.clone(), SESSION_REFRESH_INTERVAL);
    refresher.start().await;

    let api: Arc<dyn BackendApi> = backend;
    let result = vpnbot_telegram::router::run_polling(cfg, api)
        .await
        .map_err(|e| vpnbot_core::Error::External(format!("telegram bot failed: {e}")));

    refresher.stop().await;
    result
}
