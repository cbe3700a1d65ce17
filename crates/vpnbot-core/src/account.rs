//! Chat identity → backend account resolution.
//!
//! Account-scoped operations live on [`AccountScope`], which can only be
//! obtained by resolving the chat first. A chat with no bound account yields
//! `Error::UserNotFound` so callers can route to registration.

use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};

use crate::{
    backend::BackendApi,
    domain::{AccountId, CatalogId, ChatId, ServiceInstanceId},
    errors::Error,
    models::{
        Account, Balance, ChatProfile, MarzbanKey, Payment, Registration, ServiceDetail,
        ServiceStatus, UserService,
    },
    Result,
};

const PASSWORD_LEN: usize = 12;

#[derive(Clone)]
pub struct AccountService {
    backend: Arc<dyn BackendApi>,
}

impl AccountService {
    pub fn new(backend: Arc<dyn BackendApi>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn BackendApi> {
        &self.backend
    }

    /// Look up the account bound to `chat_id`. `Ok(None)` means "not registered".
    ///
    /// The backend filter narrows by derived login only; the embedded chat id is
    /// re-checked here so a colliding login never resolves to someone else.
    pub async fn resolve_account(&self, chat_id: ChatId) -> Result<Option<Account>> {
        let candidates = self.backend.find_accounts(chat_id).await?;
        Ok(candidates
            .into_iter()
            .find(|acc| acc.bound_chat() == Some(chat_id)))
    }

    /// Resolve the chat or fail with `Error::UserNotFound`.
    pub async fn scoped(&self, chat_id: ChatId) -> Result<AccountScope> {
        let account = self
            .resolve_account(chat_id)
            .await?
            .ok_or(Error::UserNotFound)?;
        Ok(AccountScope {
            chat_id,
            account,
            backend: self.backend.clone(),
        })
    }

    /// Create a backend account bound to `chat_id`.
    pub async fn register(&self, chat_id: ChatId, profile: &ChatProfile) -> Result<()> {
        let registration = Registration::new(chat_id, profile, generate_password());
        self.backend.register_account(&registration).await?;
        tracing::info!(chat_id = chat_id.0, "registered new account");
        Ok(())
    }
}

/// A resolved account plus the operations that require one.
#[derive(Clone)]
pub struct AccountScope {
    chat_id: ChatId,
    account: Account,
    backend: Arc<dyn BackendApi>,
}

impl AccountScope {
    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn account_id(&self) -> AccountId {
        self.account.account_id()
    }

    pub async fn balance(&self) -> Result<Balance> {
        self.backend.get_balance(self.account_id()).await
    }

    pub async fn services(&self) -> Result<Vec<UserService>> {
        self.backend.list_user_services(self.account_id()).await
    }

    /// One service instance of this account, with its Marzban link bundle when
    /// the service is an active Marzban one. Instances owned by another account
    /// are reported as absent.
    pub async fn service(&self, id: ServiceInstanceId) -> Result<Option<ServiceDetail>> {
        let Some(service) = self.backend.get_user_service(id).await? else {
            return Ok(None);
        };
        if service.user_id != self.account.id {
            tracing::warn!(
                chat_id = self.chat_id.0,
                service_id = id.0,
                "service instance belongs to another account"
            );
            return Ok(None);
        }

        let marzban = if service.status == ServiceStatus::Active && service.is_marzban() {
            Some(self.marzban_key(id).await?)
        } else {
            None
        };

        Ok(Some(ServiceDetail { service, marzban }))
    }

    pub async fn order(&self, item: CatalogId) -> Result<Option<UserService>> {
        self.backend.place_order(self.account_id(), item).await
    }

    pub async fn delete(&self, id: ServiceInstanceId) -> Result<()> {
        self.backend.delete_user_service(self.account_id(), id).await
    }

    pub async fn download_key(&self, id: ServiceInstanceId) -> Result<Vec<u8>> {
        self.backend.download_key_file(self.account_id(), id).await
    }

    pub async fn marzban_key(&self, id: ServiceInstanceId) -> Result<MarzbanKey> {
        self.backend.get_marzban_key(self.account_id(), id).await
    }

    pub async fn payments(&self) -> Result<Vec<Payment>> {
        self.backend.list_payments(self.account_id()).await
    }

    pub async fn has_withdrawal(&self, item: CatalogId) -> Result<bool> {
        self.backend.has_withdrawal(self.account_id(), item).await
    }
}

/// Random alphanumeric password for new accounts.
///
/// Non-cryptographic on purpose: users never see or use this password; the
/// chat binding is the real credential.
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{account, user_service, FakeBackend};

    fn service_with(backend: &Arc<FakeBackend>) -> AccountService {
        AccountService::new(backend.clone())
    }

    #[tokio::test]
    async fn resolve_returns_none_when_unregistered() {
        let backend = Arc::new(FakeBackend::default());
        let svc = service_with(&backend);

        assert_eq!(svc.resolve_account(ChatId(1)).await.unwrap(), None);
        let err = svc.scoped(ChatId(1)).await.err().unwrap();
        assert!(err.is_user_not_found());
    }

    #[tokio::test]
    async fn resolve_rejects_login_collisions() {
        let backend = Arc::new(FakeBackend::default());
        // Same login, different embedded chat id.
        let mut impostor = account(5, 42);
        impostor.settings.telegram.chat_id = Some(99);
        backend.force_lookup_result(ChatId(42), vec![impostor]);

        let svc = service_with(&backend);
        assert_eq!(svc.resolve_account(ChatId(42)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn resolve_picks_matching_account() {
        let backend = Arc::new(FakeBackend::default());
        backend.add_account(account(7, 42));

        let scope = service_with(&backend).scoped(ChatId(42)).await.unwrap();
        assert_eq!(scope.account_id(), AccountId(7));
    }

    #[tokio::test]
    async fn service_hides_foreign_instances() {
        let backend = Arc::new(FakeBackend::default());
        backend.add_account(account(7, 42));
        backend.add_service(user_service(100, 8, "ACTIVE", "vpn-wg"));

        let scope = service_with(&backend).scoped(ChatId(42)).await.unwrap();
        assert_eq!(scope.service(ServiceInstanceId(100)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn active_marzban_service_carries_links() {
        let backend = Arc::new(FakeBackend::default());
        backend.add_account(account(7, 42));
        backend.add_service(user_service(100, 7, "ACTIVE", "vpn-mz-nl"));
        backend.add_service(user_service(101, 7, "BLOCK", "vpn-mz-nl"));

        let scope = service_with(&backend).scoped(ChatId(42)).await.unwrap();

        let active = scope.service(ServiceInstanceId(100)).await.unwrap().unwrap();
        assert!(active.marzban.is_some());

        let blocked = scope.service(ServiceInstanceId(101)).await.unwrap().unwrap();
        assert!(blocked.marzban.is_none());
    }

    #[tokio::test]
    async fn register_submits_derived_login() {
        let backend = Arc::new(FakeBackend::default());
        let svc = service_with(&backend);

        let profile = ChatProfile {
            user_id: 42,
            first_name: "Ann".to_string(),
            ..ChatProfile::default()
        };
        svc.register(ChatId(42), &profile).await.unwrap();

        let regs = backend.registrations();
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].login, "@42");
        assert_eq!(regs[0].password.len(), PASSWORD_LEN);
        assert!(svc.resolve_account(ChatId(42)).await.unwrap().is_some());
    }

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let a = generate_password();
        let b = generate_password();
        assert_eq!(a.len(), PASSWORD_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
