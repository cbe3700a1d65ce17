//! Conversation router: inbound events → account/trial operations → screens.
//!
//! Every account-scoped command resolves the chat's account once, up front;
//! a missing account turns into the registration screen and never reaches the
//! command handler. All other failures go through [`ConversationRouter::fail`].

use std::{sync::Arc, time::Duration};

use crate::{
    account::{AccountScope, AccountService},
    command::{Command, Decoded, SlashCommand},
    config::Config,
    domain::{CatalogId, ChatId, MessageRef, ServiceInstanceId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ButtonPress, Inbound, InboundKind},
    },
    models::ChatProfile,
    screens::{self, Screens},
    trial::{TrialGate, TrialVerdict},
    Result,
};

/// Where a request came from: the chat, plus the menu message that carried the
/// pressed button (if any). Navigating away replaces that message.
#[derive(Clone, Copy, Debug)]
struct Origin {
    chat_id: ChatId,
    message: Option<MessageRef>,
}

pub struct ConversationRouter {
    screens: Screens,
    accounts: AccountService,
    trial: Arc<TrialGate>,
    messenger: Arc<dyn MessagingPort>,
    delete_settle_delay: Duration,
}

impl ConversationRouter {
    pub fn new(
        cfg: &Config,
        accounts: AccountService,
        trial: Arc<TrialGate>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            screens: Screens::from_config(cfg),
            accounts,
            trial,
            messenger,
            delete_settle_delay: cfg.delete_settle_delay,
        }
    }

    /// Handle one inbound event. Never fails: errors are logged and rendered.
    pub async fn handle(&self, inbound: Inbound) {
        let Inbound {
            chat_id,
            profile,
            kind,
        } = inbound;

        match kind {
            InboundKind::Command(cmd) => self.handle_slash(chat_id, &profile, cmd).await,
            InboundKind::Button(press) => self.handle_button(chat_id, &profile, press).await,
        }
    }

    async fn handle_slash(&self, chat_id: ChatId, profile: &ChatProfile, cmd: SlashCommand) {
        let origin = Origin {
            chat_id,
            message: None,
        };
        let result = match &cmd {
            SlashCommand::Start { param } => self.start(origin, param.as_deref()).await,
            SlashCommand::Register => self.register(origin, profile).await,
            SlashCommand::Other(name) => {
                tracing::debug!(chat_id = chat_id.0, command = %name, "ignoring slash command");
                Ok(())
            }
        };
        let (action, command) = match cmd {
            SlashCommand::Start { .. } => ("start", None),
            SlashCommand::Register => ("register", Some(Command::Register)),
            SlashCommand::Other(_) => ("other", None),
        };
        if let Err(e) = result {
            self.fail(chat_id, action, command, e).await;
        }
    }

    async fn handle_button(&self, chat_id: ChatId, profile: &ChatProfile, press: ButtonPress) {
        let command = match Command::decode(&press.data) {
            Decoded::Command(c) => c,
            Decoded::Unknown(verb) => {
                tracing::info!(chat_id = chat_id.0, verb = %verb, "unknown button command");
                self.answer(&press.callback_id, Some(screens::MSG_UNKNOWN_COMMAND))
                    .await;
                return;
            }
            Decoded::Malformed { verb, reason } => {
                tracing::warn!(chat_id = chat_id.0, verb = %verb, reason = %reason, "malformed button payload");
                self.answer(&press.callback_id, Some(screens::MSG_UNKNOWN_COMMAND))
                    .await;
                return;
            }
        };

        self.answer(&press.callback_id, None).await;

        let origin = Origin {
            chat_id,
            message: press.message,
        };
        if let Err(e) = self.dispatch(origin, profile, command).await {
            self.fail(chat_id, command.verb(), Some(command), e).await;
        }
    }

    async fn dispatch(&self, origin: Origin, profile: &ChatProfile, command: Command) -> Result<()> {
        tracing::debug!(chat_id = origin.chat_id.0, action = command.verb(), "dispatching");

        if !command.requires_account() {
            return match command {
                Command::Help => self.show_help(origin).await,
                _ => self.register(origin, profile).await,
            };
        }

        let scope = self.accounts.scoped(origin.chat_id).await?;
        match command {
            Command::Menu => self.show_main_menu(origin, &scope).await,
            Command::Balance => self.show_balance(origin, &scope).await,
            Command::List => self.show_list(origin, &scope).await,
            Command::PriceList => self.show_price_list(origin, &scope).await,
            Command::Payments => self.show_payments(origin, &scope).await,
            Command::Trial => self.claim_trial(origin, &scope).await,
            Command::Service(id) => self.show_service(origin, &scope, id).await,
            Command::Order(item) => self.order(origin, &scope, item).await,
            Command::DownloadKey(id) => self.send_key_file(&scope, id).await,
            Command::ShowQr(id) => self.send_key_qr(&scope, id).await,
            Command::ShowMarzbanKeys(id) => self.send_marzban_keys(&scope, id).await,
            Command::Delete(id) => self.confirm_delete(origin, id).await,
            Command::DeleteConfirmed(id) => self.delete(origin, &scope, id).await,
            // Handled above without an account.
            Command::Register | Command::Help => Ok(()),
        }
    }

    async fn start(&self, origin: Origin, param: Option<&str>) -> Result<()> {
        // Grant before the registration check so the invite survives onboarding.
        self.trial.observe_start_param(origin.chat_id, param).await;

        let scope = self.accounts.scoped(origin.chat_id).await?;
        self.show_main_menu(origin, &scope).await
    }

    async fn register(&self, origin: Origin, profile: &ChatProfile) -> Result<()> {
        let scope = match self.accounts.scoped(origin.chat_id).await {
            Ok(scope) => {
                tracing::debug!(chat_id = origin.chat_id.0, "already registered");
                scope
            }
            Err(Error::UserNotFound) => {
                self.accounts.register(origin.chat_id, profile).await?;
                self.accounts.scoped(origin.chat_id).await?
            }
            Err(e) => return Err(e),
        };
        self.show_main_menu(origin, &scope).await
    }

    async fn show_main_menu(&self, origin: Origin, scope: &AccountScope) -> Result<()> {
        self.dismiss(origin).await;
        let verdict = self.trial.evaluate(scope).await?;
        let screen = self.screens.main_menu(verdict.offered_item());
        self.messenger.send_screen(origin.chat_id, &screen).await?;
        Ok(())
    }

    async fn show_balance(&self, origin: Origin, scope: &AccountScope) -> Result<()> {
        self.dismiss(origin).await;
        let balance = scope.balance().await?;
        self.messenger
            .send_screen(origin.chat_id, &self.screens.balance(&balance))
            .await?;
        Ok(())
    }

    async fn show_list(&self, origin: Origin, scope: &AccountScope) -> Result<()> {
        self.dismiss(origin).await;
        let services = scope.services().await?;
        self.messenger
            .send_screen(origin.chat_id, &self.screens.service_list(&services))
            .await?;
        Ok(())
    }

    async fn show_price_list(&self, origin: Origin, scope: &AccountScope) -> Result<()> {
        self.dismiss(origin).await;
        let catalog = self.accounts.backend().list_catalog().await?;
        let verdict = self.trial.evaluate(scope).await?;
        let screen = self.screens.price_list(verdict.offered_item(), &catalog);
        self.messenger.send_screen(origin.chat_id, &screen).await?;
        Ok(())
    }

    async fn show_help(&self, origin: Origin) -> Result<()> {
        self.dismiss(origin).await;
        self.messenger
            .send_screen(origin.chat_id, &self.screens.help())
            .await?;
        Ok(())
    }

    async fn show_payments(&self, origin: Origin, scope: &AccountScope) -> Result<()> {
        self.dismiss(origin).await;
        let payments = scope.payments().await?;
        self.messenger
            .send_screen(origin.chat_id, &self.screens.payments(&payments))
            .await?;
        Ok(())
    }

    async fn show_service(
        &self,
        origin: Origin,
        scope: &AccountScope,
        id: ServiceInstanceId,
    ) -> Result<()> {
        self.dismiss(origin).await;
        match scope.service(id).await? {
            Some(detail) => {
                self.messenger
                    .send_screen(origin.chat_id, &self.screens.service_detail(&detail))
                    .await?;
            }
            None => {
                tracing::info!(chat_id = origin.chat_id.0, service_id = id.0, "service not found");
                self.messenger
                    .send_html(origin.chat_id, screens::MSG_SERVICE_NOT_FOUND)
                    .await?;
            }
        }
        Ok(())
    }

    async fn order(&self, origin: Origin, scope: &AccountScope, item: CatalogId) -> Result<()> {
        let placed = scope.order(item).await?;
        tracing::info!(
            chat_id = origin.chat_id.0,
            item_id = item.0,
            instance_id = placed.as_ref().map(|s| s.id),
            "service ordered"
        );
        self.show_list(origin, scope).await
    }

    /// Execute path of the trial: the same verdict that decides whether the
    /// button is shown decides whether the order goes through.
    async fn claim_trial(&self, origin: Origin, scope: &AccountScope) -> Result<()> {
        self.dismiss(origin).await;
        let chat_id = origin.chat_id;

        match self.trial.evaluate(scope).await? {
            TrialVerdict::Offer(item) => {
                scope.order(item.catalog_id()).await?;
                tracing::info!(chat_id = chat_id.0, item_id = item.id, "trial issued");
                let after = Origin {
                    chat_id,
                    message: None,
                };
                self.show_list(after, scope).await
            }
            TrialVerdict::NeedsInvite => {
                self.messenger
                    .send_html(chat_id, screens::MSG_TRIAL_NEEDS_INVITE)
                    .await?;
                Ok(())
            }
            TrialVerdict::Claimed => {
                let name = self.trial_item_name().await;
                self.messenger
                    .send_html(chat_id, &screens::trial_already_claimed(name.as_deref()))
                    .await?;
                Ok(())
            }
            TrialVerdict::Disabled | TrialVerdict::Unavailable => {
                self.messenger
                    .send_html(chat_id, screens::MSG_TRIAL_UNAVAILABLE)
                    .await?;
                Ok(())
            }
        }
    }

    async fn trial_item_name(&self) -> Option<String> {
        let id = self.trial.config().active_service_id()?;
        match self.accounts.backend().get_catalog_item(id).await {
            Ok(item) => item.map(|i| i.name),
            Err(e) => {
                tracing::debug!(item_id = id.0, error = %e, "trial item name lookup failed");
                None
            }
        }
    }

    async fn send_key_file(&self, scope: &AccountScope, id: ServiceInstanceId) -> Result<()> {
        let bytes = scope.download_key(id).await?;
        self.messenger
            .send_document(scope.chat_id(), &screens::key_file_name(id), bytes)
            .await?;
        Ok(())
    }

    async fn send_key_qr(&self, scope: &AccountScope, id: ServiceInstanceId) -> Result<()> {
        let bytes = scope.download_key(id).await?;
        let content = String::from_utf8_lossy(&bytes);
        self.messenger
            .send_qr(scope.chat_id(), &content, screens::MSG_QR_CAPTION)
            .await?;
        Ok(())
    }

    async fn send_marzban_keys(&self, scope: &AccountScope, id: ServiceInstanceId) -> Result<()> {
        let key = scope.marzban_key(id).await?;
        let chat_id = scope.chat_id();
        self.messenger
            .send_qr(
                chat_id,
                &key.subscription_url,
                &screens::subscription_caption(&key),
            )
            .await?;
        if let Some(link) = key.links.first() {
            self.messenger
                .send_qr(chat_id, link, &screens::link_caption(link))
                .await?;
        }
        Ok(())
    }

    async fn confirm_delete(&self, origin: Origin, id: ServiceInstanceId) -> Result<()> {
        self.dismiss(origin).await;
        self.messenger
            .send_screen(origin.chat_id, &self.screens.delete_confirmation(id))
            .await?;
        Ok(())
    }

    async fn delete(&self, origin: Origin, scope: &AccountScope, id: ServiceInstanceId) -> Result<()> {
        scope.delete(id).await?;
        tracing::info!(chat_id = origin.chat_id.0, service_id = id.0, "service deleted");

        self.dismiss(origin).await;
        if !self.delete_settle_delay.is_zero() {
            tokio::time::sleep(self.delete_settle_delay).await;
        }
        let after = Origin {
            chat_id: origin.chat_id,
            message: None,
        };
        self.show_list(after, scope).await
    }

    /// Remove the menu message the button was pressed on. Best effort.
    async fn dismiss(&self, origin: Origin) {
        let Some(msg) = origin.message else {
            return;
        };
        if let Err(e) = self.messenger.delete_message(msg).await {
            tracing::debug!(chat_id = origin.chat_id.0, error = %e, "failed to delete menu message");
        }
    }

    async fn answer(&self, callback_id: &str, text: Option<&str>) {
        if let Err(e) = self.messenger.answer_callback_query(callback_id, text).await {
            tracing::debug!(error = %e, "failed to answer callback query");
        }
    }

    /// The one failure-rendering path.
    async fn fail(&self, chat_id: ChatId, action: &str, command: Option<Command>, err: Error) {
        let sent = if err.is_user_not_found() {
            tracing::info!(chat_id = chat_id.0, action, "chat not registered");
            self.messenger
                .send_screen(chat_id, &self.screens.registration())
                .await
        } else {
            tracing::warn!(chat_id = chat_id.0, action, error = %err, "request failed");
            self.messenger
                .send_html(chat_id, screens::failure_message(command))
                .await
        };
        if let Err(e) = sent {
            tracing::error!(chat_id = chat_id.0, action, error = %e, "failed to notify chat");
        }
    }
}
