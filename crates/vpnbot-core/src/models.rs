//! Backend (SHM billing API) payload models.
//!
//! Deserialization is lenient: the API is inconsistent about numbers vs
//! strings for ids and amounts, and omits fields freely.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{AccountId, CatalogId, ChatId, ServiceInstanceId};

/// Backend account bound to a chat.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Account {
    #[serde(rename = "user_id", deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(default)]
    pub login: String,
    #[serde(default, deserialize_with = "de_f64")]
    pub balance: f64,
    #[serde(default)]
    pub settings: AccountSettings,
}

impl Account {
    pub fn account_id(&self) -> AccountId {
        AccountId(self.id)
    }

    /// Chat identity embedded in the account settings, if any.
    pub fn bound_chat(&self) -> Option<ChatId> {
        self.settings.telegram.chat_id.map(ChatId)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSettings {
    #[serde(default)]
    pub telegram: TelegramInfo,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelegramInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub chat_id: Option<i64>,
    #[serde(
        rename = "telegram_bot",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bot_profile: Option<serde_json::Value>,
}

/// Chat-side profile used to register a new account.
#[derive(Clone, Debug, Default)]
pub struct ChatProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
    pub is_premium: bool,
}

impl ChatProfile {
    pub fn full_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Registration {
    pub login: String,
    pub password: String,
    pub full_name: String,
    pub settings: AccountSettings,
}

impl Registration {
    pub fn new(chat_id: ChatId, profile: &ChatProfile, password: String) -> Self {
        Self {
            login: chat_id.login(),
            password,
            full_name: profile.full_name(),
            settings: AccountSettings {
                telegram: TelegramInfo {
                    user_id: Some(profile.user_id.to_string()),
                    username: profile.username.clone(),
                    login: profile.username.clone(),
                    first_name: Some(profile.first_name.clone()),
                    last_name: profile.last_name.clone(),
                    language_code: profile.language_code.clone(),
                    is_premium: profile.is_premium,
                    chat_id: Some(chat_id.0),
                    bot_profile: Some(serde_json::json!({
                        "chat_id": chat_id.0,
                        "status": "member",
                    })),
                },
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Balance {
    #[serde(rename = "user_id", deserialize_with = "de_i64")]
    pub account_id: i64,
    #[serde(default, deserialize_with = "de_f64")]
    pub balance: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub forecast: f64,
}

/// Lifecycle status of a service instance.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ServiceStatus {
    Active,
    Blocked,
    NotPaid,
    Progress,
    Other(String),
}

impl From<String> for ServiceStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ACTIVE" => ServiceStatus::Active,
            "BLOCK" => ServiceStatus::Blocked,
            "NOT PAID" => ServiceStatus::NotPaid,
            "PROGRESS" => ServiceStatus::Progress,
            _ => ServiceStatus::Other(s),
        }
    }
}

/// A missing or null status is an unknown one, not a decode failure.
impl From<Option<String>> for ServiceStatus {
    fn from(s: Option<String>) -> Self {
        s.unwrap_or_default().into()
    }
}

impl Default for ServiceStatus {
    fn default() -> Self {
        ServiceStatus::Other(String::new())
    }
}

/// One account's provisioned service.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UserService {
    #[serde(rename = "user_service_id", deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub service_id: i64,
    #[serde(default, deserialize_with = "de_i64")]
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub expire: Option<String>,
    #[serde(default)]
    pub category: String,
}

impl UserService {
    pub fn instance_id(&self) -> ServiceInstanceId {
        ServiceInstanceId(self.id)
    }

    /// Marzban-backed services hand out subscription links instead of key files.
    pub fn is_marzban(&self) -> bool {
        self.category.starts_with("vpn-mz-")
    }
}

/// Orderable catalog entry.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CatalogItem {
    #[serde(rename = "service_id", deserialize_with = "de_i64")]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "de_f64")]
    pub cost: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub period: f64,
    #[serde(default)]
    pub category: String,
}

impl CatalogItem {
    pub fn catalog_id(&self) -> CatalogId {
        CatalogId(self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub date: String,
    #[serde(default, deserialize_with = "de_f64")]
    pub money: f64,
}

/// Subscription link bundle for a Marzban-backed service.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct MarzbanKey {
    #[serde(default)]
    pub subscription_url: String,
    #[serde(default)]
    pub links: Vec<String>,
}

/// A service instance plus the data needed to render its detail screen.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceDetail {
    pub service: UserService,
    pub marzban: Option<MarzbanKey>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Int(i64),
    Float(f64),
    Str(String),
}

fn de_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match NumOrStr::deserialize(d)? {
        NumOrStr::Int(v) => Ok(v),
        NumOrStr::Float(v) => Ok(v as i64),
        NumOrStr::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<NumOrStr>::deserialize(d)? {
        Some(NumOrStr::Int(v)) => Some(v),
        Some(NumOrStr::Float(v)) => Some(v as i64),
        Some(NumOrStr::Str(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn de_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(match Option::<NumOrStr>::deserialize(d)? {
        Some(NumOrStr::Int(v)) => v as f64,
        Some(NumOrStr::Float(v)) => v,
        Some(NumOrStr::Str(s)) => s.trim().parse().unwrap_or(0.0),
        None => 0.0,
    })
}

fn de_opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.filter(|s| !s.trim().is_empty()))
}
