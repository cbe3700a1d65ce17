use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use vpnbot_core::{
    backend::BackendApi,
    config::{ApiConfig, Config},
    domain::{AccountId, CatalogId, ChatId, ServiceInstanceId},
    errors::Error,
    formatting::truncate_text,
    models::{Account, Balance, CatalogItem, MarzbanKey, Payment, Registration, UserService},
    session::SessionAuthenticator,
    Result,
};

use crate::envelope::{decode_list, decode_one};

const AUTH_PATH: &str = "/shm/user/auth.cgi";
const LOGGED_BODY_CHARS: usize = 300;

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    session_id: Option<String>,
}

/// Authenticated client for the SHM billing API.
///
/// One session token is shared by all requests and sent as the `session_id`
/// cookie. A 401/403 triggers one re-authentication and a single retry with
/// the new token; a second rejection is returned as `Error::Backend`.
pub struct BackendSession {
    base_url: String,
    login: String,
    password: String,
    services_category: Option<String>,
    http: reqwest::Client,
    token: Mutex<Option<String>>,
    // Serializes authenticate-then-store so concurrent re-logins collapse.
    auth_lock: Mutex<()>,
}

impl BackendSession {
    pub fn new(api: &ApiConfig, services_category: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(api.timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            base_url: api.base_url.trim_end_matches('/').to_string(),
            login: api.login.clone(),
            password: api.password.clone(),
            services_category,
            http,
            token: Mutex::new(None),
            auth_lock: Mutex::new(()),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(&cfg.api, cfg.services_category.clone())
    }

    pub async fn has_session(&self) -> bool {
        self.token.lock().await.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn current_token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }

    async fn login_and_store(&self) -> Result<()> {
        let resp = self
            .http
            .post(self.url(AUTH_PATH))
            .json(&json!({ "login": self.login, "password": self.password }))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("auth request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Auth(format!("auth response read failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Auth(format!("auth returned {status}")));
        }

        let parsed: AuthResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Auth(format!("malformed auth response: {e}")))?;
        let session_id = parsed
            .session_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Auth("auth response carried no session_id".to_string()))?;

        *self.token.lock().await = Some(session_id);
        Ok(())
    }

    /// Re-login after `stale` was rejected, unless another task already did.
    async fn reauthenticate(&self, stale: Option<&str>) -> Result<()> {
        let _guard = self.auth_lock.lock().await;
        let current = self.current_token().await;
        if current.is_some() && current.as_deref() != stale {
            return Ok(());
        }
        self.login_and_store().await
    }

    async fn send_once(
        &self,
        what: &str,
        request: RequestBuilder,
        token: Option<&str>,
    ) -> Result<reqwest::Response> {
        let request = match token {
            Some(t) => request.header(header::COOKIE, format!("session_id={t}")),
            None => request,
        };
        request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{what}: {e}")))
    }

    /// Issue one API call and return the raw body of a 2xx response.
    async fn execute<F>(&self, what: &str, build: F) -> Result<Vec<u8>>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.current_token().await;
        let mut resp = self.send_once(what, build(&self.http), token.as_deref()).await?;

        if matches!(resp.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            tracing::info!(
                call = what,
                status = resp.status().as_u16(),
                "session rejected; re-authenticating"
            );
            self.reauthenticate(token.as_deref()).await?;
            let fresh = self.current_token().await;
            resp = self.send_once(what, build(&self.http), fresh.as_deref()).await?;
        }

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("{what}: {e}")))?
            .to_vec();

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(
                call = what,
                status = status.as_u16(),
                body = %truncate_text(&text, LOGGED_BODY_CHARS),
                "backend call failed"
            );
            return Err(Error::Backend {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(body)
    }

    async fn get_filtered(&self, what: &str, path: &str, filter: Value) -> Result<Vec<u8>> {
        let url = self.url(path);
        let filter = filter.to_string();
        self.execute(what, |http| {
            http.get(&url).query(&[("filter", filter.as_str())])
        })
        .await
    }

    fn with_category(&self, mut filter: Value) -> Value {
        if let (Some(category), Some(map)) = (&self.services_category, filter.as_object_mut()) {
            map.insert("category".to_string(), Value::String(category.clone()));
        }
        filter
    }
}

#[async_trait]
impl SessionAuthenticator for BackendSession {
    async fn authenticate(&self) -> Result<()> {
        let _guard = self.auth_lock.lock().await;
        self.login_and_store().await
    }
}

#[async_trait]
impl BackendApi for BackendSession {
    async fn find_accounts(&self, chat_id: ChatId) -> Result<Vec<Account>> {
        let body = self
            .get_filtered(
                "find_accounts",
                "/shm/v1/admin/user",
                json!({ "login": chat_id.login() }),
            )
            .await?;
        decode_list("find_accounts", &body)
    }

    async fn register_account(&self, registration: &Registration) -> Result<()> {
        let url = self.url("/shm/v1/admin/user");
        self.execute("register_account", |http| {
            http.put(&url)
                .header(header::ACCEPT, "application/json")
                .json(registration)
        })
        .await?;
        Ok(())
    }

    async fn get_balance(&self, account: AccountId) -> Result<Balance> {
        let url = self.url("/shm/v1/template/getUserBalance");
        let uid = account.0.to_string();
        let body = self
            .execute("get_balance", |http| {
                http.get(&url)
                    .query(&[("format", "json"), ("uid", uid.as_str())])
            })
            .await?;
        decode_one("get_balance", &body)?
            .ok_or_else(|| Error::Decode("get_balance: empty response".to_string()))
    }

    async fn list_user_services(&self, account: AccountId) -> Result<Vec<UserService>> {
        let filter = self.with_category(json!({ "user_id": account.0 }));
        let body = self
            .get_filtered("list_user_services", "/shm/v1/admin/user/service", filter)
            .await?;
        decode_list("list_user_services", &body)
    }

    async fn get_user_service(&self, id: ServiceInstanceId) -> Result<Option<UserService>> {
        let body = self
            .get_filtered(
                "get_user_service",
                "/shm/v1/admin/user/service",
                json!({ "user_service_id": id.0 }),
            )
            .await?;
        Ok(decode_list("get_user_service", &body)?.into_iter().next())
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogItem>> {
        let filter = self.with_category(json!({ "allow_to_order": 1 }));
        let body = self
            .get_filtered("list_catalog", "/shm/v1/admin/service", filter)
            .await?;
        let mut items: Vec<CatalogItem> = decode_list("list_catalog", &body)?;
        items.sort_by(|a, b| a.period.total_cmp(&b.period));
        Ok(items)
    }

    async fn get_catalog_item(&self, id: CatalogId) -> Result<Option<CatalogItem>> {
        let url = self.url("/shm/v1/admin/service");
        let service_id = id.0.to_string();
        let body = self
            .execute("get_catalog_item", |http| {
                http.get(&url)
                    .header(header::ACCEPT, "application/json")
                    .query(&[("service_id", service_id.as_str()), ("limit", "1")])
            })
            .await?;
        Ok(decode_list("get_catalog_item", &body)?.into_iter().next())
    }

    async fn place_order(
        &self,
        account: AccountId,
        item: CatalogId,
    ) -> Result<Option<UserService>> {
        let url = self.url("/shm/v1/admin/service/order");
        let payload = json!({
            "service_id": item.0,
            "user_id": account.0,
            "check_exists_unpaid": 1,
        });
        let body = self
            .execute("place_order", |http| {
                http.put(&url)
                    .header(header::ACCEPT, "application/json")
                    .json(&payload)
            })
            .await?;
        Ok(decode_list("place_order", &body)?.into_iter().next())
    }

    async fn delete_user_service(&self, account: AccountId, id: ServiceInstanceId) -> Result<()> {
        let url = self.url("/shm/v1/admin/user/service");
        let user_id = account.0.to_string();
        let instance = id.0.to_string();
        self.execute("delete_user_service", |http| {
            http.request(Method::DELETE, &url).query(&[
                ("user_id", user_id.as_str()),
                ("user_service_id", instance.as_str()),
            ])
        })
        .await?;
        Ok(())
    }

    async fn download_key_file(
        &self,
        account: AccountId,
        id: ServiceInstanceId,
    ) -> Result<Vec<u8>> {
        let url = self.url("/shm/v1/template/uploadDocumentFromStorage");
        let uid = account.0.to_string();
        let name = format!("vpn{id}");
        self.execute("download_key_file", |http| {
            http.get(&url)
                .query(&[("uid", uid.as_str()), ("name", name.as_str())])
        })
        .await
    }

    async fn list_payments(&self, account: AccountId) -> Result<Vec<Payment>> {
        let body = self
            .get_filtered(
                "list_payments",
                "/shm/v1/admin/user/pay",
                json!({ "user_id": account.0 }),
            )
            .await?;
        decode_list("list_payments", &body)
    }

    async fn has_withdrawal(&self, account: AccountId, item: CatalogId) -> Result<bool> {
        let body = self
            .get_filtered(
                "has_withdrawal",
                "/shm/v1/admin/user/service/withdraw",
                json!({ "user_id": account.0, "service_id": item.0 }),
            )
            .await?;
        let rows: Vec<Value> = decode_list("has_withdrawal", &body)?;
        Ok(!rows.is_empty())
    }

    async fn get_marzban_key(
        &self,
        account: AccountId,
        id: ServiceInstanceId,
    ) -> Result<MarzbanKey> {
        let url = self.url(&format!("/shm/v1/storage/manage/vpn_mrzb_{id}"));
        let user_id = account.0.to_string();
        let body = self
            .execute("get_marzban_key", |http| {
                http.get(&url).query(&[("user_id", user_id.as_str())])
            })
            .await?;
        decode_one("get_marzban_key", &body)?
            .ok_or_else(|| Error::Decode("get_marzban_key: empty response".to_string()))
    }
}
