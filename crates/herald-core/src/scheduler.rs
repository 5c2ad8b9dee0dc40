//! Deferred announcements.
//!
//! Admins queue items with `!schedule <date> <time> <text>`. A background
//! loop calls [`Scheduler::tick`] on a fixed interval; each tick delivers
//! every unsent item whose due time has passed to the users currently in
//! the directory, then flips the item to sent and rewrites the table.
//!
//! Items are never deleted. The sent flag only moves from `false` to
//! `true`, and is persisted before the next tick looks at the table again.

use crate::clock::Clock;
use crate::delivery::{deliver_all, DeliveryReport, Outbound};
use crate::directory::Directory;
use crate::storage::{StorageError, TableStore};
use crate::transport::{TextFormat, Transport};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Prefix of the admin schedule directive.
pub const SCHEDULE_SIGIL: &str = "!schedule";
/// Usage hint returned for malformed directives.
pub const SCHEDULE_USAGE: &str = "❗ Format: !schedule YYYY-MM-DD HH:MM text";

const ID_LEN: usize = 8;
const DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

/// Persisted schedule table, append-only.
pub type ScheduleTable = Vec<ScheduleItem>;

/// Errors produced while reading a schedule directive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Directive is missing the date or time.
    #[error("malformed schedule directive")]
    Malformed,
    /// Date or time could not be parsed.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),
    /// Neither text nor a message to forward.
    #[error("nothing to schedule")]
    EmptyPayload,
}

impl ScheduleError {
    /// Text shown to the admin.
    #[must_use]
    pub fn usage_hint(&self) -> String {
        match self {
            Self::Malformed | Self::EmptyPayload => SCHEDULE_USAGE.to_string(),
            Self::InvalidDateTime(_) => {
                "❗ Invalid date/time. Example: !schedule 2025-12-31 20:30 Message text".to_string()
            }
        }
    }
}

/// What a scheduled item delivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulePayload {
    /// Announcement text.
    Text {
        /// Body
        text: String,
    },
    /// Forward of a stored message.
    #[serde(rename = "forward")]
    ForwardReference {
        /// Chat holding the message.
        source_chat: String,
        /// Message reference.
        message_id: i32,
    },
}

/// One queued announcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleItem {
    /// Random unique token.
    pub id: String,
    /// Payload, tagged by kind.
    #[serde(flatten)]
    pub payload: SchedulePayload,
    /// When it becomes deliverable.
    pub due: DateTime<Utc>,
    /// Admin who queued it.
    pub created_by: String,
    /// When it was queued.
    pub created_at: DateTime<Utc>,
    /// Delivered flag, never reset.
    #[serde(default)]
    pub sent: bool,
    /// When it was delivered.
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

/// A parsed `!schedule` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    /// Due time.
    pub due: DateTime<Utc>,
    /// Remaining text after date and time, trimmed.
    pub body: String,
}

/// Whether `text` is a schedule directive.
#[must_use]
pub fn is_schedule_directive(text: &str) -> bool {
    text.strip_prefix(SCHEDULE_SIGIL)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Parse `!schedule <date> <time> [text]`, reading the wall-clock time in `offset`.
///
/// The due time is not required to be in the future; past times fire on
/// the next tick.
///
/// # Errors
///
/// Returns [`ScheduleError::Malformed`] if the date or time is missing and
/// [`ScheduleError::InvalidDateTime`] if they cannot be parsed.
pub fn parse_schedule_directive(
    text: &str,
    offset: FixedOffset,
) -> Result<ScheduleRequest, ScheduleError> {
    let rest = text
        .strip_prefix(SCHEDULE_SIGIL)
        .ok_or(ScheduleError::Malformed)?
        .trim_start();
    let mut parts = rest.splitn(3, char::is_whitespace);
    let date = parts.next().filter(|p| !p.is_empty()).ok_or(ScheduleError::Malformed)?;
    let time = parts.next().filter(|p| !p.is_empty()).ok_or(ScheduleError::Malformed)?;
    let body = parts.next().unwrap_or_default().trim().to_string();

    let stamp = format!("{date} {time}");
    let naive = DATE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&stamp, format).ok())
        .ok_or_else(|| ScheduleError::InvalidDateTime(stamp.clone()))?;
    let due = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or(ScheduleError::InvalidDateTime(stamp))?
        .with_timezone(&Utc);

    Ok(ScheduleRequest { due, body })
}

/// Outcome of one delivered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredItem {
    /// Item id.
    pub id: String,
    /// Per-recipient outcome.
    pub report: DeliveryReport,
}

/// Queue of scheduled announcements backed by a table store.
pub struct Scheduler {
    items: Mutex<ScheduleTable>,
    store: Arc<dyn TableStore<ScheduleTable>>,
    directory: Arc<Directory>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl Scheduler {
    /// Load the queue from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the schedule table cannot be loaded.
    pub async fn load(
        store: Arc<dyn TableStore<ScheduleTable>>,
        directory: Arc<Directory>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        prefix: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let items = store.load().await?;
        let pending = items.iter().filter(|item| !item.sent).count();
        info!(
            "Schedule loaded: {} items ({} pending).",
            items.len(),
            pending
        );
        Ok(Self {
            items: Mutex::new(items),
            store,
            directory,
            transport,
            clock,
            prefix: prefix.into(),
        })
    }

    async fn persist(&self, items: &ScheduleTable) {
        if let Err(e) = self.store.save(items).await {
            error!("Failed to persist schedule table: {e}");
        }
    }

    fn new_id(items: &ScheduleTable) -> String {
        loop {
            let candidate: String = uuid::Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(ID_LEN)
                .collect();
            if !items.iter().any(|item| item.id == candidate) {
                return candidate;
            }
        }
    }

    /// Queue a new item and persist it.
    pub async fn create(
        &self,
        payload: SchedulePayload,
        due: DateTime<Utc>,
        creator: &str,
    ) -> ScheduleItem {
        let mut items = self.items.lock().await;
        let item = ScheduleItem {
            id: Self::new_id(&items),
            payload,
            due,
            created_by: creator.to_string(),
            created_at: self.clock.now(),
            sent: false,
            sent_at: None,
        };
        items.push(item.clone());
        self.persist(&items).await;
        info!("Scheduled item {} for {} by {}", item.id, item.due, creator);
        item
    }

    /// All items, oldest first.
    pub async fn items(&self) -> Vec<ScheduleItem> {
        self.items.lock().await.clone()
    }

    /// Unsent items whose due time has passed.
    pub async fn due_items(&self) -> Vec<ScheduleItem> {
        let now = self.clock.now();
        self.items
            .lock()
            .await
            .iter()
            .filter(|item| !item.sent && item.due <= now)
            .cloned()
            .collect()
    }

    async fn mark_sent(&self, id: &str) {
        let now = self.clock.now();
        let mut items = self.items.lock().await;
        if let Some(item) = items.iter_mut().find(|item| item.id == id && !item.sent) {
            item.sent = true;
            item.sent_at = Some(now);
            self.persist(&items).await;
        }
    }

    async fn deliver(&self, item: &ScheduleItem) -> DeliveryReport {
        let recipients = self.directory.ids().await;
        match &item.payload {
            SchedulePayload::Text { text } => {
                let body = format!("{}\n{}", self.prefix, html_escape::encode_text(text));
                deliver_all(
                    self.transport.as_ref(),
                    recipients,
                    Outbound::Text {
                        text: &body,
                        format: TextFormat::Html,
                    },
                )
                .await
            }
            SchedulePayload::ForwardReference {
                source_chat,
                message_id,
            } => {
                deliver_all(
                    self.transport.as_ref(),
                    recipients,
                    Outbound::Forward {
                        source_chat,
                        message_id: *message_id,
                    },
                )
                .await
            }
        }
    }

    /// Deliver every due item once and mark it sent.
    pub async fn tick(&self) -> Vec<DeliveredItem> {
        let mut delivered = Vec::new();
        for item in self.due_items().await {
            let report = self.deliver(&item).await;
            self.mark_sent(&item.id).await;
            info!(
                "Scheduled announcement {} delivered ({} ok, {} failed).",
                item.id,
                report.delivered,
                report.failed()
            );
            delivered.push(DeliveredItem {
                id: item.id,
                report,
            });
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc offset")
    }

    #[test]
    fn test_parse_full_directive() {
        let request =
            parse_schedule_directive("!schedule 2099-01-01 10:00 Happy New Year", utc())
                .expect("valid");
        assert_eq!(request.due.to_rfc3339(), "2099-01-01T10:00:00+00:00");
        assert_eq!(request.body, "Happy New Year");
    }

    #[test]
    fn test_parse_applies_offset() {
        let tashkent = FixedOffset::east_opt(5 * 3600).expect("offset");
        let request =
            parse_schedule_directive("!schedule 2025-12-31 20:30 hi", tashkent).expect("valid");
        assert_eq!(request.due.hour(), 15);
    }

    #[test]
    fn test_parse_without_body() {
        let request = parse_schedule_directive("!schedule 2025-01-01 08:00", utc()).expect("valid");
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_schedule_directive("!schedule 2025-01-01", utc()),
            Err(ScheduleError::Malformed)
        );
        assert_eq!(
            parse_schedule_directive("!schedule", utc()),
            Err(ScheduleError::Malformed)
        );
        assert!(matches!(
            parse_schedule_directive("!schedule tomorrow noon hi", utc()),
            Err(ScheduleError::InvalidDateTime(_))
        ));
        assert!(matches!(
            parse_schedule_directive("!schedule 2025-02-30 10:00 hi", utc()),
            Err(ScheduleError::InvalidDateTime(_))
        ));
    }

    #[test]
    fn test_directive_detection() {
        assert!(is_schedule_directive("!schedule 2025-01-01 10:00 x"));
        assert!(is_schedule_directive("!schedule"));
        assert!(!is_schedule_directive("!scheduled"));
        assert!(!is_schedule_directive("schedule"));
    }

    #[test]
    fn test_item_serialization_shape() {
        let item = ScheduleItem {
            id: "abc".into(),
            payload: SchedulePayload::Text { text: "hi".into() },
            due: Utc::now(),
            created_by: "1".into(),
            created_at: Utc::now(),
            sent: false,
            sent_at: None,
        };
        let json = serde_json::to_value(&item).expect("serialize");
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "hi");

        let forward = ScheduleItem {
            payload: SchedulePayload::ForwardReference {
                source_chat: "9".into(),
                message_id: 3,
            },
            ..item
        };
        let json = serde_json::to_value(&forward).expect("serialize");
        assert_eq!(json["kind"], "forward");
        let back: ScheduleItem = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, forward);
    }
}
