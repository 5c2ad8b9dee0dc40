//! Admin free-text addressing.
//!
//! An admin targets one user by writing `@@<id>` (five or more digits) or
//! `@<handle>` anywhere in a message. Only the first directive counts; the
//! directive token is cut out and the rest of the text becomes the body.
//!
//! [`parse_directive`] is a pure tokenizer. [`resolve`] adds the directory
//! lookup for handles.

use crate::directory::Directory;
use thiserror::Error;

/// Sigil introducing a raw identifier.
pub const TAG_SIGIL: &str = "@@";
/// Sigil introducing a handle.
pub const HANDLE_SIGIL: char = '@';
/// Minimum digits after [`TAG_SIGIL`].
pub const TAG_MIN_DIGITS: usize = 5;

/// Result of scanning admin text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// No addressing directive in the text.
    None,
    /// `@@<id>`: address a raw identifier.
    Tag {
        /// Literal identifier.
        id: String,
        /// Text with the directive removed, trimmed.
        body: String,
    },
    /// `@<handle>`: address a directory user by handle.
    Handle {
        /// Handle without the sigil.
        handle: String,
        /// Text with the directive removed, trimmed.
        body: String,
    },
}

/// Handle directive that matched no directory user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No user carries this handle.
    #[error("handle @{0} not found")]
    HandleNotFound(String),
}

/// How a target was addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Via {
    /// Raw identifier.
    Tag,
    /// Directory handle.
    Handle(String),
}

/// A resolved delivery target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Recipient identifier.
    pub recipient: String,
    /// Message body, never empty.
    pub body: String,
    /// Which directive produced it.
    pub via: Via,
}

const fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn cut(text: &str, start: usize, end: usize) -> String {
    let mut body = String::with_capacity(text.len());
    body.push_str(&text[..start]);
    body.push_str(&text[end..]);
    body.trim().to_string()
}

/// First `@@<digits>` token: (start, end, id).
fn find_tag(text: &str) -> Option<(usize, usize, &str)> {
    text.match_indices(HANDLE_SIGIL).find_map(|(start, _)| {
        if !text[start..].starts_with(TAG_SIGIL) {
            return None;
        }
        let digits_start = start + TAG_SIGIL.len();
        let rest = &text[digits_start..];
        let digits_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_len < TAG_MIN_DIGITS {
            return None;
        }
        // A word character right after the digits means no word boundary
        if rest[digits_len..].chars().next().is_some_and(is_word) {
            return None;
        }
        let end = digits_start + digits_len;
        Some((start, end, &text[digits_start..end]))
    })
}

/// First `@<word>` token: (start, end, handle).
fn find_handle(text: &str) -> Option<(usize, usize, &str)> {
    text.match_indices(HANDLE_SIGIL).find_map(|(start, _)| {
        let handle_start = start + HANDLE_SIGIL.len_utf8();
        let rest = &text[handle_start..];
        let handle_len = rest.find(|c: char| !is_word(c)).unwrap_or(rest.len());
        if handle_len == 0 {
            return None;
        }
        let end = handle_start + handle_len;
        Some((start, end, &text[handle_start..end]))
    })
}

/// Scan admin text for an addressing directive. Tags take precedence.
#[must_use]
pub fn parse_directive(text: &str) -> Directive {
    if let Some((start, end, id)) = find_tag(text) {
        return Directive::Tag {
            id: id.to_string(),
            body: cut(text, start, end),
        };
    }
    if let Some((start, end, handle)) = find_handle(text) {
        return Directive::Handle {
            handle: handle.to_string(),
            body: cut(text, start, end),
        };
    }
    Directive::None
}

/// Resolve admin text into a target.
///
/// Returns `Ok(None)` when the text holds no directive. A tag never touches
/// the directory; a handle must match a user.
///
/// # Errors
///
/// Returns [`ResolveError::HandleNotFound`] if no user has the handle.
pub async fn resolve(
    directory: &Directory,
    text: &str,
    empty_body: &str,
) -> Result<Option<Address>, ResolveError> {
    let non_empty = |body: String| {
        if body.is_empty() {
            empty_body.to_string()
        } else {
            body
        }
    };

    match parse_directive(text) {
        Directive::None => Ok(None),
        Directive::Tag { id, body } => Ok(Some(Address {
            recipient: id,
            body: non_empty(body),
            via: Via::Tag,
        })),
        Directive::Handle { handle, body } => {
            let record = directory
                .find_by_handle(&handle)
                .await
                .ok_or_else(|| ResolveError::HandleNotFound(handle.clone()))?;
            Ok(Some(Address {
                recipient: record.id,
                body: non_empty(body),
                via: Via::Handle(handle),
            }))
        }
    }
}
