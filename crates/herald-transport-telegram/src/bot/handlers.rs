use anyhow::Result;
use herald_core::dispatch::Dispatcher;
use herald_core::event::{CallbackEvent, InboundMessage, MediaKind, Sender};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{MessageOrigin, User};
use tracing::{debug, info};

/// Core sender built from a Telegram user.
#[must_use]
pub fn sender_from_user(user: &User) -> Sender {
    Sender {
        id: user.id.0.cast_signed().to_string(),
        handle: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
    }
}

/// Kind of the attached media, if any.
#[must_use]
pub fn media_kind(msg: &Message) -> Option<MediaKind> {
    if msg.photo().is_some() {
        Some(MediaKind::Photo)
    } else if msg.video().is_some() {
        Some(MediaKind::Video)
    } else if msg.document().is_some() {
        Some(MediaKind::Document)
    } else if msg.audio().is_some() {
        Some(MediaKind::Audio)
    } else {
        None
    }
}

/// Human-readable label for where a forwarded message came from.
#[must_use]
pub fn forward_label(origin: &MessageOrigin) -> String {
    match origin {
        MessageOrigin::User { sender_user, .. } => match sender_user.username.as_deref() {
            Some(username) => format!("{} (@{username})", sender_user.full_name()),
            None => sender_user.full_name(),
        },
        MessageOrigin::HiddenUser {
            sender_user_name, ..
        } => sender_user_name.clone(),
        MessageOrigin::Chat { sender_chat, .. } => {
            sender_chat.title().unwrap_or("unknown").to_string()
        }
        MessageOrigin::Channel { chat, .. } => chat.title().unwrap_or("unknown").to_string(),
    }
}

/// Translate a Telegram message into a core event.
#[must_use]
pub fn inbound_from_message(msg: &Message) -> InboundMessage {
    let chat_id = msg.chat.id.0.to_string();
    let sender = msg.from.as_ref().map_or_else(
        || Sender {
            id: chat_id.clone(),
            first_name: msg.chat.title().unwrap_or("Unknown").to_string(),
            ..Sender::default()
        },
        sender_from_user,
    );

    InboundMessage {
        chat_id,
        message_id: msg.id.0,
        sender,
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        media: media_kind(msg),
        forward_origin: msg.forward_origin().map(forward_label),
        reply_to: msg.reply_to_message().map(|reply| reply.id.0),
    }
}

/// Translate a button press into a core event.
///
/// Confirmations go to the private chat with the presser.
#[must_use]
pub fn callback_from_query(q: &CallbackQuery) -> CallbackEvent {
    let sender = sender_from_user(&q.from);
    CallbackEvent {
        chat_id: sender.id.clone(),
        sender,
        data: q.data.clone(),
    }
}

/// Run one Telegram message through the dispatcher.
///
/// # Errors
///
/// Returns an error if the dispatcher could not reply to the sender.
pub async fn handle_message(msg: Message, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let inbound = inbound_from_message(&msg);
    let outcome = dispatcher.handle_message(&inbound).await?;
    debug!(
        "Message {} from chat {} handled: {:?}",
        inbound.message_id, inbound.chat_id, outcome
    );
    Ok(())
}

/// Run one callback query through the dispatcher and answer it.
///
/// # Errors
///
/// Returns an error if handling or answering the query fails.
pub async fn handle_callback(bot: Bot, q: CallbackQuery, dispatcher: Arc<Dispatcher>) -> Result<()> {
    let event = callback_from_query(&q);
    info!(
        "Callback {:?} from user {}",
        event.data.as_deref().unwrap_or_default(),
        event.sender.id
    );

    let toast = dispatcher.handle_callback(&event).await;
    let mut answer = bot.answer_callback_query(q.id.clone());
    if let Ok(text) = &toast {
        answer = answer.text(text.clone());
    }
    answer.await?;
    toast.map(|_| ())
}
