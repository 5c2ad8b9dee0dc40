//! Transport-agnostic inbound events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Photo
    Photo,
    /// Video
    Video,
    /// Document / file
    Document,
    /// Audio track
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// The person behind an inbound event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    /// Stable sender identifier (admin checks use this).
    pub id: String,
    /// Optional handle without the leading `@`.
    pub handle: Option<String>,
    /// First name as shown by the transport.
    pub first_name: String,
    /// Optional last name.
    pub last_name: Option<String>,
}

impl Sender {
    /// First and last name joined with a space.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref() {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }
}

/// One inbound chat message.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    /// Chat the message arrived in; replies and the directory key use it.
    pub chat_id: String,
    /// Transport message reference, used for forwarding.
    pub message_id: i32,
    /// Who sent it.
    pub sender: Sender,
    /// Text, or the caption of a media message.
    pub text: Option<String>,
    /// Attached media, if any.
    pub media: Option<MediaKind>,
    /// Label of the original author when the message was forwarded.
    pub forward_origin: Option<String>,
    /// Message this one replies to, in the same chat.
    pub reply_to: Option<i32>,
}

impl InboundMessage {
    /// Text or caption, empty when absent.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Whether media is attached.
    #[must_use]
    pub const fn has_media(&self) -> bool {
        self.media.is_some()
    }
}

/// An inline button press.
#[derive(Debug, Clone, Default)]
pub struct CallbackEvent {
    /// Chat where the confirmation goes (private chat with the presser).
    pub chat_id: String,
    /// Who pressed the button.
    pub sender: Sender,
    /// Action payload attached to the button.
    pub data: Option<String>,
}
