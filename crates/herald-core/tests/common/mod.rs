//! Hermetic wiring shared by the integration tests: an in-memory
//! transport that records every call, memory tables and a frozen clock.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use herald_core::clock::{Clock, ManualClock};
use herald_core::config::RelaySettings;
use herald_core::content::Content;
use herald_core::directory::{Directory, UsersTable};
use herald_core::dispatch::Dispatcher;
use herald_core::event::{InboundMessage, MediaKind, Sender};
use herald_core::scheduler::{ScheduleTable, Scheduler};
use herald_core::storage::MemoryTable;
use herald_core::transport::{Action, TextFormat, Transport, TransportError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const ADMIN: &str = "90001";

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        to: String,
        text: String,
        format: TextFormat,
    },
    Forward {
        to: String,
        from: String,
        message_id: i32,
    },
    Menu {
        to: String,
        text: String,
        format: TextFormat,
        rows: usize,
    },
    Actions {
        to: String,
        text: String,
        data: Vec<String>,
    },
}

impl Sent {
    pub fn recipient(&self) -> &str {
        match self {
            Self::Text { to, .. }
            | Self::Forward { to, .. }
            | Self::Menu { to, .. }
            | Self::Actions { to, .. } => to,
        }
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<HashMap<String, TransportError>>,
}

impl RecordingTransport {
    /// Every later call to `recipient` fails with `error`.
    pub fn fail_for(&self, recipient: &str, error: TransportError) {
        self.failing
            .lock()
            .expect("lock")
            .insert(recipient.to_string(), error);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("lock").clone()
    }

    pub fn clear(&self) {
        self.sent.lock().expect("lock").clear();
    }

    pub fn to(&self, recipient: &str) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|sent| sent.recipient() == recipient)
            .collect()
    }

    pub fn texts_to(&self, recipient: &str) -> Vec<String> {
        self.to(recipient)
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Text { text, .. } | Sent::Menu { text, .. } | Sent::Actions { text, .. } => {
                    Some(text)
                }
                Sent::Forward { .. } => None,
            })
            .collect()
    }

    fn record(&self, recipient: &str, sent: Sent) -> Result<(), TransportError> {
        if let Some(error) = self.failing.lock().expect("lock").get(recipient) {
            return Err(error.clone());
        }
        self.sent.lock().expect("lock").push(sent);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        recipient: &str,
        text: &str,
        format: TextFormat,
    ) -> Result<(), TransportError> {
        self.record(
            recipient,
            Sent::Text {
                to: recipient.to_string(),
                text: text.to_string(),
                format,
            },
        )
    }

    async fn forward_message(
        &self,
        recipient: &str,
        source_chat: &str,
        message_id: i32,
    ) -> Result<(), TransportError> {
        self.record(
            recipient,
            Sent::Forward {
                to: recipient.to_string(),
                from: source_chat.to_string(),
                message_id,
            },
        )
    }

    async fn send_menu(
        &self,
        recipient: &str,
        text: &str,
        format: TextFormat,
        rows: &[Vec<String>],
    ) -> Result<(), TransportError> {
        self.record(
            recipient,
            Sent::Menu {
                to: recipient.to_string(),
                text: text.to_string(),
                format,
                rows: rows.len(),
            },
        )
    }

    async fn send_actions(
        &self,
        recipient: &str,
        text: &str,
        actions: &[Action],
    ) -> Result<(), TransportError> {
        self.record(
            recipient,
            Sent::Actions {
                to: recipient.to_string(),
                text: text.to_string(),
                data: actions.iter().map(|action| action.data.clone()).collect(),
            },
        )
    }
}

pub struct Harness {
    pub dispatcher: Dispatcher,
    pub transport: Arc<RecordingTransport>,
    pub clock: Arc<ManualClock>,
    pub directory: Arc<Directory>,
    pub scheduler: Arc<Scheduler>,
    pub users: Arc<MemoryTable<UsersTable>>,
    pub schedules: Arc<MemoryTable<ScheduleTable>>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid start time")
}

pub fn settings() -> RelaySettings {
    RelaySettings {
        admin_ids_str: Some(ADMIN.to_string()),
        ..RelaySettings::default()
    }
}

pub async fn harness() -> Harness {
    harness_with_content(settings(), Content::default()).await
}

pub async fn harness_with_content(settings: RelaySettings, content: Content) -> Harness {
    let content = Arc::new(content);
    let transport = Arc::new(RecordingTransport::default());
    let clock = Arc::new(ManualClock::new(start_time()));
    let users = Arc::new(MemoryTable::<UsersTable>::default());
    let schedules = Arc::new(MemoryTable::<ScheduleTable>::default());

    let clock_dyn: Arc<dyn Clock> = clock.clone();
    let transport_dyn: Arc<dyn Transport> = transport.clone();

    let directory = Arc::new(
        Directory::load(users.clone(), clock_dyn.clone())
            .await
            .expect("directory"),
    );
    let scheduler = Arc::new(
        Scheduler::load(
            schedules.clone(),
            directory.clone(),
            transport_dyn.clone(),
            clock_dyn.clone(),
            content.texts.scheduled_prefix.clone(),
        )
        .await
        .expect("scheduler"),
    );
    let dispatcher = Dispatcher::new(
        &settings,
        content,
        directory.clone(),
        scheduler.clone(),
        transport_dyn,
        clock_dyn,
    );

    Harness {
        dispatcher,
        transport,
        clock,
        directory,
        scheduler,
        users,
        schedules,
    }
}

pub fn sender(id: &str, handle: Option<&str>) -> Sender {
    Sender {
        id: id.to_string(),
        handle: handle.map(str::to_string),
        first_name: format!("User{id}"),
        last_name: None,
    }
}

/// A private-chat text message; chat id equals the sender id.
pub fn text_message(id: &str, handle: Option<&str>, text: &str) -> InboundMessage {
    InboundMessage {
        chat_id: id.to_string(),
        message_id: 1,
        sender: sender(id, handle),
        text: Some(text.to_string()),
        ..InboundMessage::default()
    }
}

pub fn media_message(id: &str, message_id: i32, caption: Option<&str>) -> InboundMessage {
    InboundMessage {
        chat_id: id.to_string(),
        message_id,
        sender: sender(id, None),
        text: caption.map(str::to_string),
        media: Some(MediaKind::Photo),
        ..InboundMessage::default()
    }
}
