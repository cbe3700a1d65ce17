use teloxide::types::CallbackQuery;

use vpnbot_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::{ButtonPress, Inbound, InboundKind},
};

use super::profile_from_user;

/// `None` when the query has no originating message (inline mode).
pub(super) fn inbound_from_callback(q: &CallbackQuery) -> Option<Inbound> {
    let msg = q.message.as_ref()?;
    let origin = MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    };
    Some(Inbound {
        chat_id: origin.chat_id,
        profile: profile_from_user(&q.from),
        kind: InboundKind::Button(button_press(
            q.id.clone(),
            q.data.clone(),
            Some(origin),
        )),
    })
}

/// Missing data is passed through as empty; the router answers it as unknown.
fn button_press(callback_id: String, data: Option<String>, message: Option<MessageRef>) -> ButtonPress {
    ButtonPress {
        callback_id,
        data: data.unwrap_or_default(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_keeps_payload_and_origin() {
        let origin = MessageRef {
            chat_id: ChatId(7),
            message_id: MessageId(99),
        };
        let press = button_press("cb-1".into(), Some("service|12".into()), Some(origin));
        assert_eq!(press.callback_id, "cb-1");
        assert_eq!(press.data, "service|12");
        assert_eq!(press.message, Some(origin));
    }

    #[test]
    fn missing_payload_becomes_empty() {
        let press = button_press("cb-2".into(), None, None);
        assert!(press.data.is_empty());
        assert!(press.message.is_none());
    }
}
