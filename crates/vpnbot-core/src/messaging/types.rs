use crate::{
    command::{Command, SlashCommand},
    domain::{ChatId, MessageRef},
    models::ChatProfile,
};

/// Cross-messenger incoming event.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub struct Inbound {
    pub chat_id: ChatId,
    pub profile: ChatProfile,
    pub kind: InboundKind,
}

#[derive(Clone, Debug)]
pub enum InboundKind {
    Command(SlashCommand),
    Button(ButtonPress),
}

#[derive(Clone, Debug)]
pub struct ButtonPress {
    pub callback_id: String,
    pub data: String,
    /// The message carrying the pressed keyboard, if the transport still has it.
    pub message: Option<MessageRef>,
}

/// Inline keyboard, one `Vec` per row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
    WebApp(String),
}

impl InlineButton {
    pub fn command(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(command.encode()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }

    pub fn web_app(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::WebApp(url.into()),
        }
    }
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        self.rows.push(buttons);
        self
    }

    pub fn single(self, button: InlineButton) -> Self {
        self.row(vec![button])
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every callback payload on the keyboard, in order.
    pub fn callbacks(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().filter_map(|b| match &b.action {
            ButtonAction::Callback(data) => Some(data.as_str()),
            _ => None,
        })
    }
}

/// One rendered menu: optional header photo, HTML text, keyboard.
#[derive(Clone, Debug, PartialEq)]
pub struct Screen {
    pub photo_url: Option<String>,
    pub html: String,
    pub keyboard: InlineKeyboard,
}

impl Screen {
    pub fn text(html: impl Into<String>) -> Self {
        Self {
            photo_url: None,
            html: html.into(),
            keyboard: InlineKeyboard::default(),
        }
    }

    pub fn with_photo(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}
