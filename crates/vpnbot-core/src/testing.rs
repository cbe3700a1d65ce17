//! In-memory fakes for the backend and messaging ports, shared by unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    backend::BackendApi,
    config::{ApiConfig, Config, TrialConfig},
    domain::{AccountId, CatalogId, ChatId, MessageId, MessageRef, ServiceInstanceId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::Screen,
    },
    models::{
        Account, AccountSettings, Balance, CatalogItem, MarzbanKey, Payment, Registration,
        ServiceStatus, TelegramInfo, UserService,
    },
    Result,
};

pub fn test_config() -> Config {
    Config {
        telegram_bot_token: "x".to_string(),
        support_chat_url: None,
        news_channel_url: None,
        logo_url: "https://logo.example/logo.jpg".to_string(),
        api: ApiConfig {
            base_url: "https://shm.example".to_string(),
            login: "admin".to_string(),
            password: "secret".to_string(),
            timeout: Duration::from_secs(10),
        },
        services_category: None,
        payments_profile: "telegram_bot".to_string(),
        trial: TrialConfig::default(),
        delete_settle_delay: Duration::ZERO,
    }
}

pub fn account(id: i64, chat: i64) -> Account {
    Account {
        id,
        login: ChatId(chat).login(),
        balance: 0.0,
        settings: AccountSettings {
            telegram: TelegramInfo {
                chat_id: Some(chat),
                ..TelegramInfo::default()
            },
        },
    }
}

pub fn user_service(id: i64, user_id: i64, status: &str, category: &str) -> UserService {
    UserService {
        id,
        service_id: 1,
        user_id,
        name: format!("VPN {id}"),
        status: ServiceStatus::from(status.to_string()),
        expire: None,
        category: category.to_string(),
    }
}

pub fn catalog_item(id: i64, name: &str, cost: f64, period: f64) -> CatalogItem {
    CatalogItem {
        id,
        name: name.to_string(),
        cost,
        period,
        category: "vpn-wg".to_string(),
    }
}

fn not_found(what: &str) -> Error {
    Error::Backend {
        status: 404,
        body: format!("{what} not found"),
    }
}

#[derive(Default)]
struct BackendState {
    accounts: Vec<Account>,
    forced_lookups: HashMap<ChatId, Vec<Account>>,
    registrations: Vec<Registration>,
    services: Vec<UserService>,
    catalog: Vec<CatalogItem>,
    payments: Vec<Payment>,
    withdrawals: HashMap<(i64, i64), bool>,
    orders: Vec<(AccountId, CatalogId)>,
    next_id: i64,
}

/// Backend with just enough behavior for router-level scenarios: ordering
/// creates an instance and records a withdrawal, deleting removes it.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    withdrawal_checks: AtomicUsize,
    fail_withdrawals: AtomicBool,
    fail_lookups: AtomicBool,
}

impl FakeBackend {
    pub fn add_account(&self, account: Account) {
        self.state.lock().unwrap().accounts.push(account);
    }

    /// Make `find_accounts(chat)` return exactly `accounts`.
    pub fn force_lookup_result(&self, chat: ChatId, accounts: Vec<Account>) {
        self.state
            .lock()
            .unwrap()
            .forced_lookups
            .insert(chat, accounts);
    }

    pub fn add_service(&self, service: UserService) {
        self.state.lock().unwrap().services.push(service);
    }

    /// Insert or replace (by id) a catalog item.
    pub fn add_catalog(&self, item: CatalogItem) {
        let mut st = self.state.lock().unwrap();
        st.catalog.retain(|c| c.id != item.id);
        st.catalog.push(item);
    }

    pub fn add_payment(&self, date: &str, money: f64) {
        self.state.lock().unwrap().payments.push(Payment {
            date: date.to_string(),
            money,
        });
    }

    pub fn set_withdrawal(&self, account: i64, item: i64, charged: bool) {
        self.state
            .lock()
            .unwrap()
            .withdrawals
            .insert((account, item), charged);
    }

    pub fn fail_withdrawals(&self, fail: bool) {
        self.fail_withdrawals.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    pub fn withdrawal_checks(&self) -> usize {
        self.withdrawal_checks.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.state.lock().unwrap().registrations.clone()
    }

    pub fn orders(&self) -> Vec<(AccountId, CatalogId)> {
        self.state.lock().unwrap().orders.clone()
    }

    pub fn service_ids(&self) -> Vec<i64> {
        self.state
            .lock()
            .unwrap()
            .services
            .iter()
            .map(|s| s.id)
            .collect()
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn find_accounts(&self, chat_id: ChatId) -> Result<Vec<Account>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }
        let st = self.state.lock().unwrap();
        if let Some(forced) = st.forced_lookups.get(&chat_id) {
            return Ok(forced.clone());
        }
        let login = chat_id.login();
        Ok(st
            .accounts
            .iter()
            .filter(|a| a.login == login)
            .cloned()
            .collect())
    }

    async fn register_account(&self, registration: &Registration) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let id = 1000 + st.next_id;
        st.accounts.push(Account {
            id,
            login: registration.login.clone(),
            balance: 0.0,
            settings: registration.settings.clone(),
        });
        st.registrations.push(registration.clone());
        Ok(())
    }

    async fn get_balance(&self, account: AccountId) -> Result<Balance> {
        let st = self.state.lock().unwrap();
        let acc = st
            .accounts
            .iter()
            .find(|a| a.id == account.0)
            .ok_or_else(|| not_found("user"))?;
        Ok(Balance {
            account_id: acc.id,
            balance: acc.balance,
            forecast: 0.0,
        })
    }

    async fn list_user_services(&self, account: AccountId) -> Result<Vec<UserService>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .iter()
            .filter(|s| s.user_id == account.0)
            .cloned()
            .collect())
    }

    async fn get_user_service(&self, id: ServiceInstanceId) -> Result<Option<UserService>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .services
            .iter()
            .find(|s| s.id == id.0)
            .cloned())
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogItem>> {
        let mut items = self.state.lock().unwrap().catalog.clone();
        items.sort_by(|a, b| a.period.total_cmp(&b.period));
        Ok(items)
    }

    async fn get_catalog_item(&self, id: CatalogId) -> Result<Option<CatalogItem>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .catalog
            .iter()
            .find(|c| c.id == id.0)
            .cloned())
    }

    async fn place_order(
        &self,
        account: AccountId,
        item: CatalogId,
    ) -> Result<Option<UserService>> {
        let mut st = self.state.lock().unwrap();
        let entry = st
            .catalog
            .iter()
            .find(|c| c.id == item.0)
            .cloned()
            .ok_or_else(|| not_found("service"))?;

        st.next_id += 1;
        let svc = UserService {
            id: 500 + st.next_id,
            service_id: entry.id,
            user_id: account.0,
            name: entry.name.clone(),
            status: if entry.cost > 0.0 {
                ServiceStatus::NotPaid
            } else {
                ServiceStatus::Progress
            },
            expire: None,
            category: entry.category.clone(),
        };
        st.services.push(svc.clone());
        st.withdrawals.insert((account.0, item.0), true);
        st.orders.push((account, item));
        Ok(Some(svc))
    }

    async fn delete_user_service(&self, account: AccountId, id: ServiceInstanceId) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let before = st.services.len();
        st.services
            .retain(|s| !(s.id == id.0 && s.user_id == account.0));
        if st.services.len() == before {
            return Err(not_found("user service"));
        }
        Ok(())
    }

    async fn download_key_file(
        &self,
        account: AccountId,
        id: ServiceInstanceId,
    ) -> Result<Vec<u8>> {
        let st = self.state.lock().unwrap();
        st.services
            .iter()
            .find(|s| s.id == id.0 && s.user_id == account.0)
            .map(|s| format!("[Interface]\n# key {}\n", s.id).into_bytes())
            .ok_or_else(|| not_found("key"))
    }

    async fn list_payments(&self, _account: AccountId) -> Result<Vec<Payment>> {
        Ok(self.state.lock().unwrap().payments.clone())
    }

    async fn has_withdrawal(&self, account: AccountId, item: CatalogId) -> Result<bool> {
        self.withdrawal_checks.fetch_add(1, Ordering::SeqCst);
        if self.fail_withdrawals.load(Ordering::SeqCst) {
            return Err(Error::Backend {
                status: 500,
                body: "withdraw lookup failed".to_string(),
            });
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .withdrawals
            .get(&(account.0, item.0))
            .copied()
            .unwrap_or(false))
    }

    async fn get_marzban_key(
        &self,
        _account: AccountId,
        id: ServiceInstanceId,
    ) -> Result<MarzbanKey> {
        Ok(MarzbanKey {
            subscription_url: format!("https://sub.example/{id}"),
            links: vec![
                format!("ss://key-{id}"),
                format!("vless://key-{id}"),
            ],
        })
    }
}

/// Everything the router pushed at the chat, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Sent {
    Html(ChatId, String),
    Screen(ChatId, Screen),
    Document(ChatId, String, Vec<u8>),
    Qr(ChatId, String, String),
    Deleted(MessageRef),
    CallbackAnswer(String, Option<String>),
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sent: Mutex<Vec<Sent>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef {
            chat_id,
            message_id: MessageId(*guard),
        }
    }

    fn push(&self, s: Sent) {
        self.sent.lock().unwrap().push(s);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn screens(&self) -> Vec<Screen> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Screen(_, screen) => Some(screen),
                _ => None,
            })
            .collect()
    }

    pub fn last_screen(&self) -> Option<Screen> {
        self.screens().pop()
    }

    pub fn htmls(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Html(_, html) => Some(html),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Deleted(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn callback_answers(&self) -> Vec<(String, Option<String>)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::CallbackAnswer(id, text) => Some((id, text)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.push(Sent::Html(chat_id, html.to_string()));
        Ok(self.alloc(chat_id))
    }

    async fn send_screen(&self, chat_id: ChatId, screen: &Screen) -> Result<MessageRef> {
        self.push(Sent::Screen(chat_id, screen.clone()));
        Ok(self.alloc(chat_id))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.push(Sent::Deleted(msg));
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<MessageRef> {
        self.push(Sent::Document(chat_id, file_name.to_string(), bytes));
        Ok(self.alloc(chat_id))
    }

    async fn send_qr(
        &self,
        chat_id: ChatId,
        content: &str,
        caption_html: &str,
    ) -> Result<MessageRef> {
        self.push(Sent::Qr(
            chat_id,
            content.to_string(),
            caption_html.to_string(),
        ));
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.push(Sent::CallbackAnswer(
            callback_id.to_string(),
            text.map(str::to_string),
        ));
        Ok(())
    }
}
