//! Trial eligibility gate.
//!
//! Per chat: Ineligible → Eligible (qualifying deep link, time-boxed) and,
//! independently, Claimed once the backend shows a charge for the trial item.
//! Claimed is permanent for the life of the process. Both maps are in memory
//! only and each has its own lock; neither lock is held across a backend call.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    account::AccountScope,
    backend::BackendApi,
    config::TrialConfig,
    domain::{CatalogId, ChatId},
    models::CatalogItem,
    Result,
};

/// Source of "now" for grant expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}

/// Outcome of the eligibility procedure.
#[derive(Clone, Debug, PartialEq)]
pub enum TrialVerdict {
    /// Feature off or no trial item configured.
    Disabled,
    /// A start parameter is required and the chat holds no live grant.
    NeedsInvite,
    /// The trial was already consumed.
    Claimed,
    /// The trial item could not be resolved or has no name.
    Unavailable,
    Offer(CatalogItem),
}

impl TrialVerdict {
    pub fn offered_item(&self) -> Option<&CatalogItem> {
        match self {
            TrialVerdict::Offer(item) => Some(item),
            _ => None,
        }
    }
}

pub struct TrialGate {
    cfg: TrialConfig,
    backend: Arc<dyn BackendApi>,
    clock: Arc<dyn Clock>,
    grants: Mutex<HashMap<ChatId, DateTime<Utc>>>,
    claimed: Mutex<HashSet<ChatId>>,
}

impl TrialGate {
    pub fn new(cfg: TrialConfig, backend: Arc<dyn BackendApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cfg,
            backend,
            clock,
            grants: Mutex::new(HashMap::new()),
            claimed: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &TrialConfig {
        &self.cfg
    }

    /// Grant eligibility if the launch parameter qualifies. Returns whether a
    /// grant was recorded.
    pub async fn observe_start_param(&self, chat_id: ChatId, param: Option<&str>) -> bool {
        if !self.cfg.enabled || !self.cfg.require_start_param {
            return false;
        }
        let Some(param) = param else {
            return false;
        };
        if !self.cfg.accepts_start_param(param) {
            tracing::debug!(chat_id = chat_id.0, "start parameter not in trial allow-list");
            return false;
        }

        let until = self.grant(chat_id).await;
        tracing::info!(chat_id = chat_id.0, until = %until, "trial eligibility granted");
        true
    }

    /// Record a grant expiring one TTL from now. A later grant replaces an
    /// earlier one.
    pub async fn grant(&self, chat_id: ChatId) -> DateTime<Utc> {
        let until = self.clock.now() + self.cfg.eligibility_ttl();
        self.grants.lock().await.insert(chat_id, until);
        until
    }

    pub async fn is_eligible(&self, chat_id: ChatId) -> bool {
        let now = self.clock.now();
        self.grants
            .lock()
            .await
            .get(&chat_id)
            .is_some_and(|until| now < *until)
    }

    /// Whether the chat already consumed the trial. Positive answers are cached
    /// forever; negative ones are re-checked against the backend every time.
    pub async fn is_claimed(&self, scope: &AccountScope, item: CatalogId) -> Result<bool> {
        let chat_id = scope.chat_id();
        if self.claimed.lock().await.contains(&chat_id) {
            return Ok(true);
        }

        let has = scope.has_withdrawal(item).await?;
        if has {
            self.claimed.lock().await.insert(chat_id);
        }
        Ok(has)
    }

    /// Run the full decision procedure. Used for both offering the trial button
    /// and claiming the trial, so the two paths cannot drift apart.
    pub async fn evaluate(&self, scope: &AccountScope) -> Result<TrialVerdict> {
        let Some(item_id) = self.cfg.active_service_id() else {
            return Ok(TrialVerdict::Disabled);
        };

        if self.cfg.require_start_param && !self.is_eligible(scope.chat_id()).await {
            return Ok(TrialVerdict::NeedsInvite);
        }

        if self.is_claimed(scope, item_id).await? {
            return Ok(TrialVerdict::Claimed);
        }

        match self.backend.get_catalog_item(item_id).await {
            Ok(Some(item)) if !item.name.trim().is_empty() => Ok(TrialVerdict::Offer(item)),
            Ok(_) => Ok(TrialVerdict::Unavailable),
            Err(e) => {
                tracing::warn!(item_id = item_id.0, error = %e, "trial catalog item lookup failed");
                Ok(TrialVerdict::Unavailable)
            }
        }
    }

    /// The catalog item to offer as a trial, if any.
    pub async fn offer(&self, scope: &AccountScope) -> Result<Option<CatalogItem>> {
        Ok(self.evaluate(scope).await?.offered_item().cloned())
    }
}
