//! Static content: FAQ table, menu labels and the fixed texts of the bot.
//!
//! A built-in default is compiled in; deployments can override it with a
//! YAML file (see [`Content::from_yaml_file`]).

use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One FAQ entry: any keyword found in the text selects `response`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FaqEntry {
    /// Lower-case keywords matched as substrings.
    pub keywords: Vec<String>,
    /// Canned answer.
    pub response: String,
}

/// One reply-keyboard button and its canned answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuEntry {
    /// Exact button label.
    pub label: String,
    /// Answer sent when the label is pressed.
    pub reply: Option<String>,
}

/// Every user-visible text the relay produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Texts {
    /// Sent on `/start` together with the menu.
    pub welcome: String,
    /// Sent on `/menu` and on "show menu" keywords.
    pub menu_prompt: String,
    /// Throttling notice.
    pub throttled: String,
    /// Acknowledgement after a message was relayed to admins.
    pub received: String,
    /// Prefix for immediate admin broadcasts.
    pub announcement_prefix: String,
    /// Prefix for scheduled broadcasts.
    pub scheduled_prefix: String,
    /// Prefix for direct admin replies.
    pub admin_reply_prefix: String,
    /// Body used when an addressed admin message has no text left.
    pub empty_admin_body: String,
    /// Prompt sent with the example inline actions.
    pub actions_prompt: String,
    /// Callback toast after registration.
    pub registered_toast: String,
    /// Message sent after registration.
    pub registered_message: String,
    /// Callback toast for unknown actions.
    pub unknown_action_toast: String,
}

impl Default for Texts {
    fn default() -> Self {
        Self {
            welcome: "Hello! Welcome to the bot. Choose one of the menu buttons below.".into(),
            menu_prompt: "Choose from the main menu:".into(),
            throttled: "You are sending messages too often. Please wait a little.".into(),
            received: "Your message has been received! Admins will reply soon.".into(),
            announcement_prefix: "📢 <b>Announcement:</b>".into(),
            scheduled_prefix: "📢 <b>Scheduled announcement:</b>".into(),
            admin_reply_prefix: "💼 <b>Admin reply:</b>".into(),
            empty_admin_body: "(message from admin)".into(),
            actions_prompt: "Use the inline buttons below:".into(),
            registered_toast: "You are registered!".into(),
            registered_message:
                "Your registration has been accepted. An admin will contact you soon.".into(),
            unknown_action_toast: "Button pressed.".into(),
        }
    }
}

/// Lookup tables and texts consumed by the responder and dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    /// Ordered FAQ table, first match wins.
    pub faq: Vec<FaqEntry>,
    /// Keywords that re-display the menu.
    pub menu_keywords: Vec<String>,
    /// Menu rows as shown on the reply keyboard.
    pub menu: Vec<Vec<MenuEntry>>,
    /// Fixed texts.
    pub texts: Texts,
}

fn faq(keywords: &[&str], response: &str) -> FaqEntry {
    FaqEntry {
        keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
        response: response.to_string(),
    }
}

fn menu(label: &str, reply: &str) -> MenuEntry {
    MenuEntry {
        label: label.to_string(),
        reply: Some(reply.to_string()),
    }
}

impl Default for Content {
    fn default() -> Self {
        Self {
            faq: vec![
                faq(
                    &["narx", "price"],
                    "📌 Course price: 100 000 so'm (1 month). Ask for details or use /contact.",
                ),
                faq(
                    &["qachon", "vaqt", "when"],
                    "🕒 Classes run Monday to Friday and start at 18:00.",
                ),
                faq(
                    &["manzil", "address"],
                    "📍 Address: Namangan, Boborahim Mashrab street, 12.",
                ),
            ],
            menu_keywords: vec!["tugma".into(), "button".into(), "menu".into()],
            menu: vec![
                vec![
                    menu("Menu", "🍽 Menu section. The menu link will follow."),
                    menu(
                        "Gifts",
                        "🎁 Contact an admin to hear about our gift offers.",
                    ),
                ],
                vec![
                    menu(
                        "Location / Contacts",
                        "📍 Location: [address]\n📞 Contacts: +998 xx xxx xx xx",
                    ),
                    menu(
                        "Rate Us",
                        "⭐️ Rate our service using this link: [rating link]",
                    ),
                ],
                vec![
                    menu("Instagram", "📸 Our Instagram page: [Instagram link]"),
                    menu(
                        "Book a Table",
                        "📝 To book a table, send your name, phone number and the time.",
                    ),
                ],
            ],
            texts: Texts::default(),
        }
    }
}

impl Content {
    /// Load content from a YAML file. Missing sections fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_yaml_file(path: &Path) -> Result<Self, StorageError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Parse content from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn from_yaml_str(raw: &str) -> Result<Self, StorageError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Menu labels laid out as keyboard rows.
    #[must_use]
    pub fn menu_rows(&self) -> Vec<Vec<String>> {
        self.menu
            .iter()
            .map(|row| row.iter().map(|entry| entry.label.clone()).collect())
            .collect()
    }

    /// Canned reply for an exact menu label, if it has one.
    #[must_use]
    pub fn menu_reply(&self, label: &str) -> Option<&str> {
        self.menu
            .iter()
            .flatten()
            .find(|entry| entry.label == label)
            .and_then(|entry| entry.reply.as_deref())
    }

    /// `/help` text; admins see the extra commands.
    #[must_use]
    pub fn help_text(is_admin: bool) -> String {
        let mut text = String::from("🤖 <b>Bot help menu</b>\n\nUseful commands:\n");
        text.push_str("/help - this help menu\n");
        text.push_str("/start - start the bot (shows the main menu)\n");
        text.push_str("/menu - show the main menu buttons\n");
        text.push_str("/contact - contact an admin\n");
        if is_admin {
            text.push_str("\n<b>Admin commands:</b>\n");
            text.push_str("/users - user statistics\n");
            text.push_str("/inline - example inline buttons\n");
            text.push_str("Reply to a user with @@ID or @username.\n");
            text.push_str("Send plain text or media (photo/video/document) to broadcast.\n");
            text.push_str("!schedule YYYY-MM-DD HH:MM text - schedule an announcement\n");
        }
        text
    }

    /// `/contact` text.
    #[must_use]
    pub fn contact_text(contact_handle: Option<&str>) -> String {
        let display = contact_handle.map_or_else(
            || "admin".to_string(),
            |handle| format!("@{}", handle.trim_start_matches('@')),
        );
        format!(
            "Contact an admin: {display}\nFor a personal matter, just message the bot and the admins will see it."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_reply_lookup() {
        let content = Content::default();
        assert!(content.menu_reply("Instagram").is_some());
        assert!(content.menu_reply("instagram").is_none());
        assert_eq!(content.menu_rows().len(), 3);
    }

    #[test]
    fn test_yaml_override_keeps_default_texts() {
        let raw = r#"
faq:
  - keywords: ["hours"]
    response: "Open 9-18"
menu:
  - - label: "Prices"
"#;
        let content = Content::from_yaml_str(raw).expect("valid yaml");
        assert_eq!(content.faq.len(), 1);
        assert_eq!(content.menu_reply("Prices"), None);
        assert_eq!(content.texts.empty_admin_body, "(message from admin)");
        // Section not present in the file keeps its default
        assert_eq!(content.menu_keywords, vec!["tugma", "button", "menu"]);
    }

    #[test]
    fn test_help_text_admin_section() {
        assert!(!Content::help_text(false).contains("/users"));
        assert!(Content::help_text(true).contains("!schedule"));
    }

    #[test]
    fn test_contact_text() {
        assert!(Content::contact_text(None).contains("admin"));
        assert!(Content::contact_text(Some("@support")).contains("@support"));
        assert!(Content::contact_text(Some("support")).contains("@support"));
    }
}
