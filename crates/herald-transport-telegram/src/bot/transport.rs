//! [`Transport`] backed by the Telegram Bot API.

use super::resilient::retry_telegram_operation;
use async_trait::async_trait;
use herald_core::transport::{Action, TextFormat, Transport, TransportError};
use teloxide::prelude::*;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup, MessageId,
    ParseMode,
};
use teloxide::{ApiError, RequestError};

/// Telegram implementation of the core transport seam.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a bot client.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Recipients are numeric chat ids.
///
/// # Errors
///
/// Returns [`TransportError::InvalidRecipient`] for anything that is not an integer.
pub fn parse_chat_id(recipient: &str) -> Result<ChatId, TransportError> {
    recipient
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| TransportError::InvalidRecipient(recipient.to_string()))
}

/// Collapse a Bot API error into the core error kinds.
#[must_use]
pub fn classify_error(err: &RequestError) -> TransportError {
    match err {
        RequestError::Api(ApiError::BotBlocked | ApiError::BotKicked) => TransportError::Blocked,
        RequestError::Api(ApiError::ChatNotFound) => TransportError::NotFound,
        other => TransportError::Other(other.to_string()),
    }
}

const fn parse_mode(format: TextFormat) -> Option<ParseMode> {
    match format {
        TextFormat::Plain => None,
        TextFormat::Html => Some(ParseMode::Html),
    }
}

/// Reply keyboard built from label rows.
#[must_use]
pub fn menu_keyboard(rows: &[Vec<String>]) -> KeyboardMarkup {
    let buttons = rows
        .iter()
        .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    KeyboardMarkup::new(buttons).resize_keyboard()
}

/// Inline keyboard with one callback button per row.
#[must_use]
pub fn actions_keyboard(actions: &[Action]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(actions.iter().map(|action| {
        vec![InlineKeyboardButton::callback(
            action.label.clone(),
            action.data.clone(),
        )]
    }))
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        recipient: &str,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError> {
        let chat_id = parse_chat_id(recipient)?;
        retry_telegram_operation(|| async {
            let mut req = self.bot.send_message(chat_id, text);
            if let Some(pm) = parse_mode(format) {
                req = req.parse_mode(pm);
            }
            req.await
        })
        .await
        .map(|_| ())
        .map_err(|e| classify_error(&e))
    }

    async fn forward_message(
        &self,
        recipient: &str,
        source_chat: &str,
        message_id: i32,
    ) -> Result<(), TransportError> {
        let chat_id = parse_chat_id(recipient)?;
        let from_chat = parse_chat_id(source_chat)?;
        retry_telegram_operation(|| async {
            self.bot
                .forward_message(chat_id, from_chat, MessageId(message_id))
                .await
        })
        .await
        .map(|_| ())
        .map_err(|e| classify_error(&e))
    }

    async fn send_menu(
        &self,
        recipient: &str,
        text: &str,
        format: TextFormat,
        rows: &[Vec<String>],
    ) -> Result<(), TransportError> {
        let chat_id = parse_chat_id(recipient)?;
        let keyboard = menu_keyboard(rows);
        retry_telegram_operation(|| async {
            let mut req = self
                .bot
                .send_message(chat_id, text)
                .reply_markup(keyboard.clone());
            if let Some(pm) = parse_mode(format) {
                req = req.parse_mode(pm);
            }
            req.await
        })
        .await
        .map(|_| ())
        .map_err(|e| classify_error(&e))
    }

    async fn send_actions(
        &self,
        recipient: &str,
        text: &str,
        actions: &[Action],
    ) -> Result<(), TransportError> {
        let chat_id = parse_chat_id(recipient)?;
        let keyboard = actions_keyboard(actions);
        retry_telegram_operation(|| async {
            self.bot
                .send_message(chat_id, text)
                .reply_markup(keyboard.clone())
                .await
        })
        .await
        .map(|_| ())
        .map_err(|e| classify_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{InlineKeyboardButtonKind, ReplyMarkup};

    #[test]
    fn test_parse_chat_id() {
        assert_eq!(parse_chat_id("123456"), Ok(ChatId(123_456)));
        assert_eq!(parse_chat_id("-100123"), Ok(ChatId(-100_123)));
        assert_eq!(
            parse_chat_id("alice"),
            Err(TransportError::InvalidRecipient("alice".into()))
        );
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(&RequestError::Api(ApiError::BotBlocked)),
            TransportError::Blocked
        );
        assert_eq!(
            classify_error(&RequestError::Api(ApiError::ChatNotFound)),
            TransportError::NotFound
        );
        assert!(matches!(
            classify_error(&RequestError::Api(ApiError::MessageTextIsEmpty)),
            TransportError::Other(_)
        ));
    }

    #[test]
    fn test_parse_mode_follows_text_format() {
        assert_eq!(parse_mode(TextFormat::Plain), None);
        assert_eq!(parse_mode(TextFormat::Html), Some(ParseMode::Html));
    }

    #[test]
    fn test_menu_keyboard_keeps_rows() {
        let rows = vec![
            vec!["Menu".to_string()],
            vec!["Gifts".to_string(), "Location".to_string()],
        ];
        let keyboard = menu_keyboard(&rows);
        assert_eq!(keyboard.keyboard.len(), 2);
        assert_eq!(keyboard.keyboard[1][1].text, "Location");
        assert!(matches!(ReplyMarkup::from(keyboard), ReplyMarkup::Keyboard(_)));
    }

    #[test]
    fn test_actions_keyboard_uses_callbacks() {
        let keyboard = actions_keyboard(&[Action {
            label: "Register".into(),
            data: "action_register".into(),
        }]);
        let button = &keyboard.inline_keyboard[0][0];
        assert_eq!(button.text, "Register");
        assert!(matches!(
            &button.kind,
            InlineKeyboardButtonKind::CallbackData(data) if data == "action_register"
        ));
    }
}
