use async_trait::async_trait;

use crate::{
    domain::{AccountId, CatalogId, ChatId, ServiceInstanceId},
    models::{Account, Balance, CatalogItem, MarzbanKey, Payment, Registration, UserService},
    Result,
};

/// Hexagonal port for the account-management backend.
///
/// Every call is a single HTTP round trip against the shared authenticated
/// session. Implementations return `Error::Backend` for non-2xx responses,
/// `Error::Transport` for network failures and `Error::Decode` for payloads
/// of the wrong shape.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Accounts whose login matches the one derived from `chat_id`. The backend
    /// filter is only a narrowing; callers must re-check the embedded chat id.
    async fn find_accounts(&self, chat_id: ChatId) -> Result<Vec<Account>>;

    async fn register_account(&self, registration: &Registration) -> Result<()>;

    async fn get_balance(&self, account: AccountId) -> Result<Balance>;

    async fn list_user_services(&self, account: AccountId) -> Result<Vec<UserService>>;

    async fn get_user_service(&self, id: ServiceInstanceId) -> Result<Option<UserService>>;

    /// Orderable catalog, sorted by period.
    async fn list_catalog(&self) -> Result<Vec<CatalogItem>>;

    async fn get_catalog_item(&self, id: CatalogId) -> Result<Option<CatalogItem>>;

    async fn place_order(&self, account: AccountId, item: CatalogId)
        -> Result<Option<UserService>>;

    async fn delete_user_service(&self, account: AccountId, id: ServiceInstanceId) -> Result<()>;

    async fn download_key_file(&self, account: AccountId, id: ServiceInstanceId)
        -> Result<Vec<u8>>;

    async fn list_payments(&self, account: AccountId) -> Result<Vec<Payment>>;

    /// True if the account was ever charged for `item`.
    async fn has_withdrawal(&self, account: AccountId, item: CatalogId) -> Result<bool>;

    async fn get_marzban_key(&self, account: AccountId, id: ServiceInstanceId)
        -> Result<MarzbanKey>;
}
