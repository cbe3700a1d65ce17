//! Telegram adapter (teloxide).
//!
//! This crate implements the `vpnbot-core` MessagingPort over Telegram Bot API.

use async_trait::async_trait;

use reqwest::Url;
use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode, WebAppInfo},
};

use tokio::time::sleep;

pub mod handlers;
pub mod qr;
pub mod router;

use vpnbot_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ButtonAction, InlineKeyboard, Screen},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn sent(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::External(format!("invalid button url {raw:?}: {e}")))
}

/// Core keyboard → Telegram inline markup.
pub fn to_markup(keyboard: &InlineKeyboard) -> Result<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(keyboard.rows.len());
    for row in &keyboard.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for b in row {
            let button = match &b.action {
                ButtonAction::Callback(data) => {
                    InlineKeyboardButton::callback(b.label.clone(), data.clone())
                }
                ButtonAction::Url(url) => InlineKeyboardButton::url(b.label.clone(), parse_url(url)?),
                ButtonAction::WebApp(url) => InlineKeyboardButton::web_app(
                    b.label.clone(),
                    WebAppInfo {
                        url: parse_url(url)?,
                    },
                ),
            };
            buttons.push(button);
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        Ok(Self::sent(chat_id, &msg))
    }

    async fn send_screen(&self, chat_id: ChatId, screen: &Screen) -> Result<MessageRef> {
        let markup = to_markup(&screen.keyboard)?;

        let msg = match &screen.photo_url {
            Some(photo) => {
                let photo = InputFile::url(parse_url(photo)?);
                self.with_retry(|| {
                    self.bot
                        .send_photo(Self::tg_chat(chat_id), photo.clone())
                        .caption(screen.html.clone())
                        .parse_mode(ParseMode::Html)
                        .reply_markup(markup.clone())
                })
                .await?
            }
            None => {
                self.with_retry(|| {
                    self.bot
                        .send_message(Self::tg_chat(chat_id), screen.html.clone())
                        .parse_mode(ParseMode::Html)
                        .reply_markup(markup.clone())
                })
                .await?
            }
        };

        Ok(Self::sent(chat_id, &msg))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<MessageRef> {
        let file = InputFile::memory(bytes).file_name(file_name.to_string());
        let msg = self
            .with_retry(|| self.bot.send_document(Self::tg_chat(chat_id), file.clone()))
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn send_qr(
        &self,
        chat_id: ChatId,
        content: &str,
        caption_html: &str,
    ) -> Result<MessageRef> {
        let png = qr::render_png(content)?;
        let file = InputFile::memory(png).file_name("qr.png");
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_photo(Self::tg_chat(chat_id), file.clone())
                    .caption(caption_html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}
