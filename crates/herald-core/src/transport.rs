//! Outbound transport seam.
//!
//! The core never talks to a chat API directly; the transport crate
//! implements [`Transport`] on top of its client library.

use async_trait::async_trait;
use thiserror::Error;

/// Longest text one message may carry, in UTF-16 code units.
pub const MAX_TEXT_LEN: usize = 4096;

/// Errors returned when delivering to a single recipient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Recipient has blocked the bot.
    #[error("recipient has blocked the bot")]
    Blocked,
    /// Recipient chat does not exist.
    #[error("recipient not found")]
    NotFound,
    /// Recipient identifier is not valid for this transport.
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Formatting applied to outbound text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Sent as-is.
    Plain,
    /// Telegram-style HTML subset; callers escape untrusted parts.
    Html,
}

/// An inline action button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Button label.
    pub label: String,
    /// Payload delivered back as a callback.
    pub data: String,
}

/// Capabilities the core consumes from the chat transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message.
    async fn send_message(
        &self,
        recipient: &str,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError>;

    /// Forward `message_id` from `source_chat` to `recipient`.
    async fn forward_message(
        &self,
        recipient: &str,
        source_chat: &str,
        message_id: i32,
    ) -> Result<(), TransportError>;

    /// Send a text together with the reply-keyboard menu.
    async fn send_menu(
        &self,
        recipient: &str,
        text: &str,
        format: TextFormat,
        rows: &[Vec<String>],
    ) -> Result<(), TransportError>;

    /// Send a text with inline action buttons.
    async fn send_actions(
        &self,
        recipient: &str,
        text: &str,
        actions: &[Action],
    ) -> Result<(), TransportError>;
}
