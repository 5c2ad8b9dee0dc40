#![deny(missing_docs)]
//! Herald core library.
//!
//! Message routing and admin dispatch for a relay bot: throttling, the user
//! directory, admin addressing, canned replies and scheduled announcements.

/// Admin free-text addressing (`@@id` / `@handle`).
pub mod addressing;
/// Wall-clock abstraction.
pub mod clock;
/// Configuration management.
pub mod config;
/// Static texts, FAQ table and menu labels.
pub mod content;
/// Fan-out delivery with per-recipient failure collection.
pub mod delivery;
/// Known users table.
pub mod directory;
/// Per-message decision pipeline.
pub mod dispatch;
/// Transport-agnostic inbound events.
pub mod event;
/// Sliding-window flood protection.
pub mod rate_limit;
/// FAQ and menu keyword matching.
pub mod responder;
/// Deferred announcements.
pub mod scheduler;
/// Table persistence (JSON files / memory).
pub mod storage;
/// Outbound transport seam.
pub mod transport;
