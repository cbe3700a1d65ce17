use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::Screen,
    Result,
};

/// Cross-messenger port.
///
/// The router only ever talks to the chat through this trait; QR rendering and
/// file formatting are the implementation's business.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;

    async fn send_screen(&self, chat_id: ChatId, screen: &Screen) -> Result<MessageRef>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<MessageRef>;

    /// Send `content` encoded as a QR image with an HTML caption.
    async fn send_qr(&self, chat_id: ChatId, content: &str, caption_html: &str)
        -> Result<MessageRef>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
