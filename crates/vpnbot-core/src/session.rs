//! Background renewal of the backend session.
//!
//! The refresher owns no token itself; it drives whatever implements
//! [`SessionAuthenticator`] (the SHM client in production) on a fixed period.
//! Failures are logged and the loop keeps going; the next tick retries.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::Result;

#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// Exchange credentials for a fresh session and store it.
    async fn authenticate(&self) -> Result<()>;
}

pub struct SessionRefresher {
    auth: Arc<dyn SessionAuthenticator>,
    interval: Duration,
    /// Running loop and the token that stops it; a fresh pair per `start`.
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl SessionRefresher {
    pub fn new(auth: Arc<dyn SessionAuthenticator>, interval: Duration) -> Self {
        Self {
            auth,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Run one renewal now. Returns whether it succeeded.
    pub async fn tick(&self) -> bool {
        refresh_once(self.auth.as_ref()).await
    }

    /// Spawn the periodic loop. The first renewal happens one interval from now;
    /// startup authentication is the caller's job. Calling twice is a no-op.
    pub async fn start(&self) {
        let mut slot = self.running.lock().await;
        if slot.is_some() {
            return;
        }

        let auth = self.auth.clone();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        refresh_once(auth.as_ref()).await;
                    }
                }
            }
            tracing::debug!("session refresher stopped");
        });
        *slot = Some((token, handle));
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(&self) {
        let running = self.running.lock().await.take();
        if let Some((token, handle)) = running {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "session refresher task failed");
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|(_, h)| !h.is_finished())
    }
}

async fn refresh_once(auth: &dyn SessionAuthenticator) -> bool {
    match auth.authenticate().await {
        Ok(()) => {
            tracing::info!("backend session refreshed");
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, "backend session refresh failed; retrying next tick");
            false
        }
    }
}
