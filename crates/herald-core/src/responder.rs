//! FAQ and menu keyword matching.

use crate::content::{Content, FaqEntry};

/// What the responder decided for a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<'a> {
    /// A canned FAQ answer.
    Faq(&'a str),
    /// The user asked for the menu.
    ShowMenu,
}

/// Stateless matcher over the FAQ table and menu keywords.
#[derive(Debug, Clone, Copy)]
pub struct Responder<'a> {
    faq: &'a [FaqEntry],
    menu_keywords: &'a [String],
}

impl<'a> Responder<'a> {
    /// Borrow the tables from `content`.
    #[must_use]
    pub fn new(content: &'a Content) -> Self {
        Self {
            faq: &content.faq,
            menu_keywords: &content.menu_keywords,
        }
    }

    /// First FAQ entry with any keyword contained in `text`.
    #[must_use]
    pub fn faq_match(&self, text: &str) -> Option<&'a str> {
        let lowered = text.to_lowercase();
        self.faq
            .iter()
            .find(|entry| {
                entry
                    .keywords
                    .iter()
                    .any(|keyword| lowered.contains(&keyword.to_lowercase()))
            })
            .map(|entry| entry.response.as_str())
    }

    /// Whether `text` asks for the menu.
    #[must_use]
    pub fn wants_menu(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.menu_keywords
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
    }

    /// FAQ answer first, then the menu signal.
    #[must_use]
    pub fn respond(&self, text: &str) -> Option<Reply<'a>> {
        if text.is_empty() {
            return None;
        }
        if let Some(answer) = self.faq_match(text) {
            return Some(Reply::Faq(answer));
        }
        self.wants_menu(text).then_some(Reply::ShowMenu)
    }
}
