use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{port::MessagingPort, types::Screen},
    Result,
};

/// Chats idle longer than this are forgotten on the next reservation.
const IDLE_CHAT_TTL: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Spacing between any two outgoing messages, across all chats.
    pub global_min_interval: Duration,
    /// Spacing between two outgoing messages to the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(34),
            per_chat_min_interval: Duration::from_millis(1000),
        }
    }
}

/// Next free send slot, globally and per chat.
#[derive(Debug)]
struct Slots {
    global: Instant,
    chats: HashMap<i64, Instant>,
}

impl Slots {
    /// Book the earliest slot allowed for `chat_id` and return how long to wait.
    fn book(&mut self, cfg: &ThrottleConfig, chat_id: i64, now: Instant) -> Duration {
        self.chats
            .retain(|_, next| now.saturating_duration_since(*next) < IDLE_CHAT_TTL);

        let chat_next = self.chats.get(&chat_id).copied().unwrap_or(now);
        let at = now.max(self.global).max(chat_next);

        self.global = at + cfg.global_min_interval;
        self.chats.insert(chat_id, at + cfg.per_chat_min_interval);
        at - now
    }
}

/// Paces outgoing messages so menu navigation stays under Telegram's flood
/// limits.
///
/// Only calls that put a new message in the chat are paced. Deleting the
/// previous menu and answering a button press go straight through: a button
/// press must be answered promptly, and a delete does not count as a send.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    slots: Mutex<Slots>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            slots: Mutex::new(Slots {
                global: Instant::now(),
                chats: HashMap::new(),
            }),
        }
    }

    async fn pace(&self, chat_id: ChatId) {
        let wait = self
            .slots
            .lock()
            .await
            .book(&self.cfg, chat_id.0, Instant::now());
        if !wait.is_zero() {
            tracing::trace!(chat_id = chat_id.0, wait_ms = wait.as_millis() as u64, "pacing send");
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn send_screen(&self, chat_id: ChatId, screen: &Screen) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner.send_screen(chat_id, screen).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.inner.delete_message(msg).await
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner.send_document(chat_id, file_name, bytes).await
    }

    async fn send_qr(
        &self,
        chat_id: ChatId,
        content: &str,
        caption_html: &str,
    ) -> Result<MessageRef> {
        self.pace(chat_id).await;
        self.inner.send_qr(chat_id, content, caption_html).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.inner.answer_callback_query(callback_id, text).await
    }
}
