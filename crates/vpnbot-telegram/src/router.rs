use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use vpnbot_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use vpnbot_core::{
    account::AccountService,
    backend::BackendApi,
    config::Config,
    messaging::port::MessagingPort,
    router::ConversationRouter,
    trial::{SystemClock, TrialGate},
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ConversationRouter>,
    pub chat_locks: Arc<ChatLocks>,
}

/// One async mutex per chat, so a chat's events are handled in arrival order
/// while different chats proceed in parallel. Entries nobody holds or waits on
/// are dropped on the next lock.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Wire the Telegram transport to the conversation router and poll until
/// Ctrl-C.
pub async fn run_polling(cfg: Arc<Config>, backend: Arc<dyn BackendApi>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "telegram bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }

    // Throttling sits above the adapter; RetryAfter is still retried inside it.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let trial = Arc::new(TrialGate::new(
        cfg.trial.clone(),
        backend.clone(),
        Arc::new(SystemClock),
    ));
    let router = Arc::new(ConversationRouter::new(
        &cfg,
        AccountService::new(backend),
        trial,
        messenger,
    ));

    let state = Arc::new(AppState {
        router,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped");
    Ok(())
}
