//! Known users table.
//!
//! The directory is the only owner of [`UserRecord`]s. Every mutation is
//! applied under one lock and immediately followed by a full rewrite of the
//! users table, so the file always mirrors memory. A failed write is logged
//! and memory stays authoritative for the running process.

use crate::clock::Clock;
use crate::storage::{StorageError, TableStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Persisted users table: records in first-seen order.
pub type UsersTable = Vec<UserRecord>;

/// A forwarded message observed from a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardEvent {
    /// When the forward arrived.
    pub at: DateTime<Utc>,
    /// Label of the original author.
    pub origin: String,
}

/// One known user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    /// Chat identifier, primary key.
    pub id: String,
    /// Handle without `@`.
    pub handle: Option<String>,
    /// Name shown in relays.
    #[serde(default)]
    pub display_name: String,
    /// First inbound message.
    pub first_seen: DateTime<Utc>,
    /// Latest inbound message.
    pub last_seen: DateTime<Utc>,
    /// Inbound messages so far.
    #[serde(default)]
    pub message_count: u64,
    /// Forwarded messages, oldest first.
    #[serde(default)]
    pub forwarded_from: Vec<ForwardEvent>,
}

/// Totals reported by `/users`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Known users.
    pub total: usize,
    /// Users seen inside the active window.
    pub active: usize,
}

#[derive(Default)]
struct UserIndex {
    records: UsersTable,
    by_id: HashMap<String, usize>,
}

impl UserIndex {
    fn from_records(records: UsersTable) -> Self {
        let mut index = Self::default();
        for record in records {
            // Keep the first record when the file holds the same id twice
            if !index.by_id.contains_key(&record.id) {
                index.by_id.insert(record.id.clone(), index.records.len());
                index.records.push(record);
            }
        }
        index
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut UserRecord> {
        let position = *self.by_id.get(id)?;
        self.records.get_mut(position)
    }
}

/// In-memory user directory kept in lockstep with its table store.
pub struct Directory {
    users: Mutex<UserIndex>,
    store: Arc<dyn TableStore<UsersTable>>,
    clock: Arc<dyn Clock>,
}

impl Directory {
    /// Load the directory from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the users table cannot be loaded.
    pub async fn load(
        store: Arc<dyn TableStore<UsersTable>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let records = store.load().await?;
        info!("Directory loaded with {} users.", records.len());
        Ok(Self {
            users: Mutex::new(UserIndex::from_records(records)),
            store,
            clock,
        })
    }

    async fn persist(&self, users: &UserIndex) {
        if let Err(e) = self.store.save(&users.records).await {
            error!("Failed to persist users table: {e}");
        }
    }

    /// Create the record on first sight, otherwise refresh handle and last-seen.
    pub async fn upsert(
        &self,
        id: &str,
        handle: Option<&str>,
        display_name: &str,
    ) -> UserRecord {
        let now = self.clock.now();
        let mut users = self.users.lock().await;

        let record = if let Some(record) = users.get_mut(id) {
            record.handle = handle.map(ToString::to_string);
            record.last_seen = record.last_seen.max(now);
            record.clone()
        } else {
            let record = UserRecord {
                id: id.to_string(),
                handle: handle.map(ToString::to_string),
                display_name: display_name.to_string(),
                first_seen: now,
                last_seen: now,
                message_count: 0,
                forwarded_from: Vec::new(),
            };
            let position = users.records.len();
            users.by_id.insert(id.to_string(), position);
            users.records.push(record.clone());
            info!("New user added: {} ({:?})", id, handle);
            record
        };

        self.persist(&users).await;
        record
    }

    /// Append a forward-origin event. Returns `false` for unknown users.
    pub async fn record_forward(&self, id: &str, origin: &str) -> bool {
        let at = self.clock.now();
        let mut users = self.users.lock().await;
        let Some(record) = users.get_mut(id) else {
            return false;
        };
        record.forwarded_from.push(ForwardEvent {
            at,
            origin: origin.to_string(),
        });
        self.persist(&users).await;
        true
    }

    /// Bump the message counter, returning the new value.
    pub async fn increment_message_count(&self, id: &str) -> Option<u64> {
        let mut users = self.users.lock().await;
        let record = users.get_mut(id)?;
        record.message_count += 1;
        let count = record.message_count;
        self.persist(&users).await;
        Some(count)
    }

    /// Case-insensitive handle lookup; the earliest-added match wins.
    pub async fn find_by_handle(&self, handle: &str) -> Option<UserRecord> {
        let wanted = handle.trim_start_matches('@').to_lowercase();
        let users = self.users.lock().await;
        users
            .records
            .iter()
            .find(|record| {
                record
                    .handle
                    .as_deref()
                    .is_some_and(|h| h.to_lowercase() == wanted)
            })
            .cloned()
    }

    /// Lookup by identifier.
    pub async fn get(&self, id: &str) -> Option<UserRecord> {
        let users = self.users.lock().await;
        users
            .by_id
            .get(id)
            .and_then(|&position| users.records.get(position))
            .cloned()
    }

    /// Snapshot of all records in first-seen order.
    pub async fn all(&self) -> Vec<UserRecord> {
        self.users.lock().await.records.clone()
    }

    /// Identifiers of all records in first-seen order.
    pub async fn ids(&self) -> Vec<String> {
        self.users
            .lock()
            .await
            .records
            .iter()
            .map(|record| record.id.clone())
            .collect()
    }

    /// Total users and users seen within `active_window` of now.
    pub async fn stats(&self, active_window: Duration) -> DirectoryStats {
        // A window reaching past the representable range counts everyone
        let cutoff = self.clock.now().checked_sub_signed(active_window);
        let users = self.users.lock().await;
        DirectoryStats {
            total: users.records.len(),
            active: users
                .records
                .iter()
                .filter(|record| cutoff.is_none_or(|cutoff| record.last_seen > cutoff))
                .count(),
        }
    }
}
