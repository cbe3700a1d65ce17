use std::{env, fs, path::Path, time::Duration};

use crate::{domain::CatalogId, errors::Error, Result};

/// Session refresh period. Not configurable.
pub const SESSION_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Grant lifetime used when the configured TTL is missing or non-positive.
pub const DEFAULT_TRIAL_TTL_HOURS: i64 = 24;

const DEFAULT_PAYMENTS_PROFILE: &str = "telegram_bot";
const DEFAULT_LOGO_URL: &str = "https://vpn-for-friends.com/logobot.jpg";

/// Typed configuration, loaded from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub support_chat_url: Option<String>,
    pub news_channel_url: Option<String>,
    pub logo_url: String,

    // Backend API
    pub api: ApiConfig,

    // Catalog / payments
    pub services_category: Option<String>,
    pub payments_profile: String,

    pub trial: TrialConfig,

    /// Pause between a destructive delete and the list re-render, so the backend
    /// has settled the new state.
    pub delete_settle_delay: Duration,
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub login: String,
    pub password: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct TrialConfig {
    pub enabled: bool,
    pub base_service_id: Option<CatalogId>,
    pub require_start_param: bool,
    pub allowed_start_params: Vec<String>,
    pub eligibility_ttl_hours: i64,
}

impl TrialConfig {
    /// Trial catalog id, only when the feature is switched on.
    pub fn active_service_id(&self) -> Option<CatalogId> {
        if !self.enabled {
            return None;
        }
        self.base_service_id.filter(|id| id.0 > 0)
    }

    pub fn eligibility_ttl(&self) -> chrono::Duration {
        let hours = if self.eligibility_ttl_hours <= 0 {
            DEFAULT_TRIAL_TTL_HOURS
        } else {
            self.eligibility_ttl_hours
        };
        chrono::Duration::hours(hours)
    }

    pub fn accepts_start_param(&self, param: &str) -> bool {
        let param = param.trim();
        !param.is_empty() && self.allowed_start_params.iter().any(|p| p == param)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let base_url = env_str("API_BASE_URL").and_then(non_empty).ok_or_else(|| {
            Error::Config("API_BASE_URL environment variable is required".to_string())
        })?;

        let api = ApiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            login: env_str("API_LOGIN").unwrap_or_default(),
            password: env_str("API_PASSWORD").unwrap_or_default(),
            timeout: Duration::from_secs(env_u64("API_TIMEOUT_SECONDS").unwrap_or(10)),
        };

        let trial = TrialConfig {
            enabled: env_bool("TRIAL_ENABLED").unwrap_or(false),
            base_service_id: env_i64("TRIAL_BASE_SERVICE_ID").map(CatalogId),
            require_start_param: env_bool("TRIAL_REQUIRE_START_PARAM").unwrap_or(false),
            allowed_start_params: parse_csv(env_str("TRIAL_ALLOWED_START_PARAMS")),
            eligibility_ttl_hours: env_i64("TRIAL_ELIGIBILITY_TTL_HOURS")
                .unwrap_or(DEFAULT_TRIAL_TTL_HOURS),
        };

        Ok(Self {
            telegram_bot_token,
            support_chat_url: env_str("SUPPORT_CHAT_URL").and_then(non_empty),
            news_channel_url: env_str("NEWS_CHANNEL_URL").and_then(non_empty),
            logo_url: env_str("LOGO_URL")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_LOGO_URL.to_string()),
            api,
            services_category: env_str("SERVICES_CATEGORY").and_then(non_empty),
            payments_profile: env_str("PAYMENTS_PROFILE")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_PAYMENTS_PROFILE.to_string()),
            trial,
            delete_settle_delay: Duration::from_millis(
                env_u64("DELETE_SETTLE_DELAY_MS").unwrap_or(2000),
            ),
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
