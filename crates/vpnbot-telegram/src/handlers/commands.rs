use vpnbot_core::{
    command::parse_slash_command,
    domain::ChatId,
    messaging::types::{Inbound, InboundKind},
    models::ChatProfile,
};

/// Slash commands become inbound events; free text is not part of the dialog.
pub(super) fn inbound_from_text(chat_id: i64, profile: ChatProfile, text: &str) -> Option<Inbound> {
    let cmd = parse_slash_command(text)?;
    Some(Inbound {
        chat_id: ChatId(chat_id),
        profile,
        kind: InboundKind::Command(cmd),
    })
}
