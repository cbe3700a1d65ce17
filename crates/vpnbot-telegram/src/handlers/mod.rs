//! Telegram update handlers.
//!
//! Each handler only translates a teloxide update into a core [`Inbound`] and
//! hands it to the conversation router under the chat's lock.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message, User},
};

use vpnbot_core::{messaging::types::Inbound, models::ChatProfile};

use crate::router::AppState;
mod callback;
mod commands;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(inbound) = callback::inbound_from_callback(&q) else {
        // Inline-mode buttons carry no chat; nothing to route.
        if let Err(e) = bot.answer_callback_query(q.id).await {
            tracing::debug!(error = %e, "answer_callback_query failed");
        }
        return Ok(());
    };
    dispatch(&state, inbound).await;
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(inbound) = commands::inbound_from_text(msg.chat.id.0, profile_from_user(user), text)
    else {
        tracing::debug!(chat_id = msg.chat.id.0, "ignoring non-command text");
        return Ok(());
    };
    dispatch(&state, inbound).await;
    Ok(())
}

async fn dispatch(state: &AppState, inbound: Inbound) {
    let _guard = state.chat_locks.lock_chat(inbound.chat_id.0).await;
    state.router.handle(inbound).await;
}

pub(crate) fn profile_from_user(user: &User) -> ChatProfile {
    ChatProfile {
        user_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
        is_premium: user.is_premium,
    }
}
