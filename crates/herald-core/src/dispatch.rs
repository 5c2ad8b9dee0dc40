//! Per-message decision pipeline.
//!
//! Every inbound message goes through the same ordered steps; the first
//! step that handles it wins:
//!
//! 1. directory bookkeeping (upsert, forward origin, message counter)
//! 2. flood check
//! 3. fixed commands (`/start`, `/menu`, `/help`, `/contact`)
//! 4. menu labels
//! 5. admin branch: `/users`, `/inline`, `!schedule`, addressing, broadcast
//! 6. FAQ auto-reply, then the "show menu" keywords
//! 7. relay to every admin and acknowledge the sender
//!
//! Failures reaching other recipients are folded into a
//! [`DeliveryReport`] and never abort the action.

use crate::addressing::{self, Address, ResolveError, Via};
use crate::clock::Clock;
use crate::config::RelaySettings;
use crate::content::Content;
use crate::delivery::{deliver_all, deliver_one, DeliveryReport, Outbound};
use crate::directory::{Directory, DirectoryStats};
use crate::event::{CallbackEvent, InboundMessage};
use crate::rate_limit::RateLimiter;
use crate::responder::{Reply, Responder};
use crate::scheduler::{
    is_schedule_directive, parse_schedule_directive, ScheduleError, SchedulePayload, Scheduler,
};
use crate::transport::{Action, TextFormat, Transport, MAX_TEXT_LEN};
use anyhow::Result;
use chrono::{Duration, FixedOffset, Offset, Utc};
use html_escape::encode_text;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback payload of the registration button.
pub const REGISTER_ACTION: &str = "action_register";
/// Prefix marking a command.
pub const COMMAND_SIGIL: char = '/';

const NOT_SET: &str = "not set";

/// Fixed commands available to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Welcome and menu.
    Start,
    /// Menu only.
    Menu,
    /// Command list.
    Help,
    /// How to reach an admin.
    Contact,
}

impl Command {
    /// Exact, case-sensitive match.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "/start" => Some(Self::Start),
            "/menu" => Some(Self::Menu),
            "/help" => Some(Self::Help),
            "/contact" => Some(Self::Contact),
            _ => None,
        }
    }
}

/// Admin-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Directory statistics.
    Users,
    /// Example inline actions.
    Inline,
}

impl AdminCommand {
    /// Exact, case-sensitive match.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "/users" => Some(Self::Users),
            "/inline" => Some(Self::Inline),
            _ => None,
        }
    }
}

/// Which branch handled a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Sender is over the rate limit.
    Throttled,
    /// A fixed command.
    Command(Command),
    /// A menu label with a canned reply.
    MenuLabel,
    /// An admin command.
    AdminCommand(AdminCommand),
    /// A schedule item was queued.
    Scheduled {
        /// Item id.
        id: String,
    },
    /// The schedule directive was rejected.
    ScheduleRejected(ScheduleError),
    /// An admin message addressed to one user.
    Addressed {
        /// Target identifier.
        recipient: String,
        /// Whether the transport accepted it.
        delivered: bool,
    },
    /// A handle directive matched nobody.
    HandleNotFound(String),
    /// An admin text would not fit in one message; nothing was sent.
    TooLong {
        /// Length of the composed text.
        length: usize,
    },
    /// An admin broadcast.
    Broadcast(DeliveryReport),
    /// An FAQ answer.
    AutoReply,
    /// The menu was shown again.
    MenuShown,
    /// The message was relayed to admins.
    Relayed(DeliveryReport),
}

/// Length of a prefixed text payload when it exceeds [`MAX_TEXT_LEN`].
///
/// Media is forwarded as-is and never oversized. Markup in `prefix` is
/// counted too, so the estimate errs long.
fn oversized(msg: &InboundMessage, prefix: &str, body: &str) -> Option<usize> {
    if msg.has_media() {
        return None;
    }
    let length = prefix.encode_utf16().count() + 1 + body.encode_utf16().count();
    (length > MAX_TEXT_LEN).then_some(length)
}

/// Orchestrates one inbound message against the directory, limiter,
/// responder and scheduler.
pub struct Dispatcher {
    directory: Arc<Directory>,
    scheduler: Arc<Scheduler>,
    transport: Arc<dyn Transport>,
    content: Arc<Content>,
    limiter: RateLimiter,
    admins: BTreeSet<String>,
    active_window: Duration,
    schedule_offset: FixedOffset,
    contact_handle: Option<String>,
}

impl Dispatcher {
    /// Wire a dispatcher from settings and its collaborators.
    #[must_use]
    pub fn new(
        settings: &RelaySettings,
        content: Arc<Content>,
        directory: Arc<Directory>,
        scheduler: Arc<Scheduler>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let schedule_offset = settings
            .schedule_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!(
                    "Invalid schedule UTC offset {} minutes, using UTC",
                    settings.schedule_utc_offset_minutes
                );
                Utc.fix()
            });

        Self {
            directory,
            scheduler,
            transport,
            content,
            limiter: RateLimiter::new(
                settings.rate_limit_window(),
                settings.rate_limit_max_messages,
                clock,
            ),
            admins: settings.admin_ids().into_iter().collect(),
            active_window: settings.active_window(),
            schedule_offset,
            contact_handle: settings.contact_handle.clone(),
        }
    }

    /// Shared directory.
    #[must_use]
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Shared scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Whether `sender_id` is a configured admin.
    #[must_use]
    pub fn is_admin(&self, sender_id: &str) -> bool {
        self.admins.contains(sender_id)
    }

    async fn reply(&self, chat: &str, text: &str, format: TextFormat) -> Result<()> {
        self.transport.send_message(chat, text, format).await?;
        Ok(())
    }

    /// Admin confirmations are best-effort.
    async fn notify(&self, chat: &str, text: &str) {
        if let Err(e) = self.transport.send_message(chat, text, TextFormat::Plain).await {
            warn!("Failed to send confirmation to {chat}: {e}");
        }
    }

    async fn show_menu(&self, chat: &str, text: &str) -> Result<()> {
        self.transport
            .send_menu(chat, text, TextFormat::Plain, &self.content.menu_rows())
            .await?;
        Ok(())
    }

    /// Run the pipeline for one message.
    ///
    /// # Errors
    ///
    /// Returns an error if a reply to the sender cannot be delivered.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Result<Outcome> {
        let chat = msg.chat_id.as_str();
        let sender = &msg.sender;
        let text = msg.text();

        self.directory
            .upsert(chat, sender.handle.as_deref(), &sender.display_name())
            .await;
        if let Some(origin) = msg.forward_origin.as_deref() {
            self.directory.record_forward(chat, origin).await;
        }
        self.directory.increment_message_count(chat).await;

        if !self.limiter.allow(chat).await {
            warn!("Throttling {} ({})", chat, sender.display_name());
            self.reply(chat, &self.content.texts.throttled, TextFormat::Plain)
                .await?;
            return Ok(Outcome::Throttled);
        }

        if let Some(command) = Command::parse(text) {
            self.run_command(command, msg).await?;
            return Ok(Outcome::Command(command));
        }

        if let Some(answer) = self.content.menu_reply(text) {
            self.reply(chat, answer, TextFormat::Plain).await?;
            return Ok(Outcome::MenuLabel);
        }

        if self.is_admin(&sender.id) {
            if let Some(outcome) = self.handle_admin(msg).await? {
                return Ok(outcome);
            }
        }

        match Responder::new(&self.content).respond(text) {
            Some(Reply::Faq(answer)) => {
                self.reply(chat, answer, TextFormat::Plain).await?;
                return Ok(Outcome::AutoReply);
            }
            Some(Reply::ShowMenu) => {
                self.show_menu(chat, &self.content.texts.menu_prompt).await?;
                return Ok(Outcome::MenuShown);
            }
            None => {}
        }

        let report = self.relay_to_admins(msg).await;
        self.reply(chat, &self.content.texts.received, TextFormat::Plain)
            .await?;
        Ok(Outcome::Relayed(report))
    }

    async fn run_command(&self, command: Command, msg: &InboundMessage) -> Result<()> {
        let chat = msg.chat_id.as_str();
        info!("{} used {:?}", chat, command);
        match command {
            Command::Start => self.show_menu(chat, &self.content.texts.welcome).await,
            Command::Menu => self.show_menu(chat, &self.content.texts.menu_prompt).await,
            Command::Help => {
                let help = Content::help_text(self.is_admin(&msg.sender.id));
                self.reply(chat, &help, TextFormat::Html).await
            }
            Command::Contact => {
                let contact = Content::contact_text(self.contact_handle.as_deref());
                self.reply(chat, &contact, TextFormat::Plain).await
            }
        }
    }

    /// Admin branch; `None` means fall through to the common steps.
    async fn handle_admin(&self, msg: &InboundMessage) -> Result<Option<Outcome>> {
        let chat = msg.chat_id.as_str();
        let text = msg.text();

        if let Some(command) = AdminCommand::parse(text) {
            match command {
                AdminCommand::Users => {
                    let stats = self.directory.stats(self.active_window).await;
                    self.reply(chat, &self.stats_text(stats), TextFormat::Plain)
                        .await?;
                }
                AdminCommand::Inline => {
                    let actions = [Action {
                        label: "Register".to_string(),
                        data: REGISTER_ACTION.to_string(),
                    }];
                    self.transport
                        .send_actions(chat, &self.content.texts.actions_prompt, &actions)
                        .await?;
                }
            }
            return Ok(Some(Outcome::AdminCommand(command)));
        }

        if is_schedule_directive(text) {
            return Ok(Some(self.schedule(msg).await));
        }

        match addressing::resolve(&self.directory, text, &self.content.texts.empty_admin_body)
            .await
        {
            Ok(Some(address)) => return Ok(Some(self.deliver_addressed(msg, address).await)),
            Err(ResolveError::HandleNotFound(handle)) => {
                self.notify(chat, &format!("⚠️ Username @{handle} not found."))
                    .await;
                return Ok(Some(Outcome::HandleNotFound(handle)));
            }
            Ok(None) => {}
        }

        if msg.has_media() || (!text.is_empty() && !text.starts_with(COMMAND_SIGIL)) {
            if let Some(length) = oversized(msg, &self.content.texts.announcement_prefix, text) {
                return Ok(Some(self.reject_too_long(chat, length).await));
            }
            return Ok(Some(Outcome::Broadcast(self.broadcast(msg).await)));
        }

        Ok(None)
    }

    async fn reject_too_long(&self, chat: &str, length: usize) -> Outcome {
        warn!("Admin text from {chat} is {length} units long, nothing sent");
        self.notify(
            chat,
            &format!("⚠️ Message too long ({length} characters, limit {MAX_TEXT_LEN}). Nothing was sent."),
        )
        .await;
        Outcome::TooLong { length }
    }

    fn stats_text(&self, stats: DirectoryStats) -> String {
        format!(
            "📊 User statistics:\nTotal: {}\nActive in the last {} days: {}",
            stats.total,
            self.active_window.num_days(),
            stats.active
        )
    }

    async fn schedule(&self, msg: &InboundMessage) -> Outcome {
        let chat = msg.chat_id.as_str();
        let request = match parse_schedule_directive(msg.text(), self.schedule_offset) {
            Ok(request) => request,
            Err(e) => {
                self.notify(chat, &e.usage_hint()).await;
                return Outcome::ScheduleRejected(e);
            }
        };

        let payload = if msg.has_media() {
            SchedulePayload::ForwardReference {
                source_chat: chat.to_string(),
                message_id: msg.message_id,
            }
        } else if !request.body.is_empty() {
            SchedulePayload::Text { text: request.body }
        } else if let Some(reply_to) = msg.reply_to {
            SchedulePayload::ForwardReference {
                source_chat: chat.to_string(),
                message_id: reply_to,
            }
        } else {
            let e = ScheduleError::EmptyPayload;
            self.notify(chat, &e.usage_hint()).await;
            return Outcome::ScheduleRejected(e);
        };

        if let SchedulePayload::Text { text } = &payload {
            if let Some(length) = oversized(msg, &self.content.texts.scheduled_prefix, text) {
                return self.reject_too_long(chat, length).await;
            }
        }

        let item = self
            .scheduler
            .create(payload, request.due, &msg.sender.id)
            .await;
        self.notify(
            chat,
            &format!(
                "📆 Announcement scheduled for {} (ID: {})",
                item.due.to_rfc3339(),
                item.id
            ),
        )
        .await;
        Outcome::Scheduled { id: item.id }
    }

    async fn deliver_addressed(&self, msg: &InboundMessage, address: Address) -> Outcome {
        let chat = msg.chat_id.as_str();
        if let Some(length) = oversized(msg, &self.content.texts.admin_reply_prefix, &address.body)
        {
            return self.reject_too_long(chat, length).await;
        }
        let payload_text;
        let payload = if msg.has_media() {
            Outbound::Forward {
                source_chat: chat,
                message_id: msg.message_id,
            }
        } else {
            payload_text = format!(
                "{}\n{}",
                self.content.texts.admin_reply_prefix,
                encode_text(&address.body)
            );
            Outbound::Text {
                text: &payload_text,
                format: TextFormat::Html,
            }
        };

        let outcome = deliver_one(self.transport.as_ref(), &address.recipient, payload).await;
        let delivered = outcome.is_ok();
        let confirmation = match (&address.via, outcome) {
            (Via::Tag, Ok(())) => format!("📤 Message sent to ID {}.", address.recipient),
            (Via::Tag, Err(e)) => {
                format!("❗ Error: user not found or has blocked the bot. {e}")
            }
            (Via::Handle(handle), Ok(())) => format!("📬 Message sent to @{handle}."),
            (Via::Handle(_), Err(e)) => format!("❗ Error: {e}"),
        };
        self.notify(chat, &confirmation).await;

        Outcome::Addressed {
            recipient: address.recipient,
            delivered,
        }
    }

    async fn broadcast(&self, msg: &InboundMessage) -> DeliveryReport {
        let chat = msg.chat_id.as_str();
        let recipients = self.directory.ids().await;

        let report = if msg.has_media() {
            deliver_all(
                self.transport.as_ref(),
                recipients,
                Outbound::Forward {
                    source_chat: chat,
                    message_id: msg.message_id,
                },
            )
            .await
        } else {
            let body = format!(
                "{}\n{}",
                self.content.texts.announcement_prefix,
                encode_text(msg.text())
            );
            deliver_all(
                self.transport.as_ref(),
                recipients,
                Outbound::Text {
                    text: &body,
                    format: TextFormat::Html,
                },
            )
            .await
        };

        info!(
            "Broadcast from {} done ({} ok, {} failed)",
            chat,
            report.delivered,
            report.failed()
        );
        self.notify(
            chat,
            &format!(
                "📡 Announcement sent to all users. (delivered: {}, failed: {})",
                report.delivered,
                report.failed()
            ),
        )
        .await;
        report
    }

    /// Summary an admin sees for a relayed message.
    #[must_use]
    pub fn relay_summary(msg: &InboundMessage) -> String {
        let handle = msg
            .sender
            .handle
            .as_deref()
            .map_or_else(|| NOT_SET.to_string(), |h| encode_text(h).into_owned());
        let body = if msg.text().is_empty() {
            "(media/message)".to_string()
        } else {
            encode_text(msg.text()).into_owned()
        };
        format!(
            "📩 <b>New message!</b>\n👤 {name}\n🆔 ID: {id}\n🌐 Username: @{handle}\n✉️ {body}\n\nReply:\n• By ID: @@{id}\n• By username: @{handle}",
            name = encode_text(&msg.sender.display_name()),
            id = encode_text(&msg.chat_id),
        )
    }

    async fn relay_to_admins(&self, msg: &InboundMessage) -> DeliveryReport {
        let summary = Self::relay_summary(msg);
        let mut report = DeliveryReport::default();
        for admin in &self.admins {
            let mut outcome = self
                .transport
                .send_message(admin, &summary, TextFormat::Html)
                .await;
            if outcome.is_ok() && msg.has_media() {
                outcome = self
                    .transport
                    .forward_message(admin, &msg.chat_id, msg.message_id)
                    .await;
            }
            report = report.record(admin, outcome);
        }
        debug!(
            "Relayed message from {} to {} admins",
            msg.chat_id, report.delivered
        );
        report
    }

    /// Handle an inline button press and return the toast text.
    ///
    /// # Errors
    ///
    /// Returns an error if the confirmation message cannot be delivered.
    pub async fn handle_callback(&self, event: &CallbackEvent) -> Result<String> {
        if event.data.as_deref() != Some(REGISTER_ACTION) {
            return Ok(self.content.texts.unknown_action_toast.clone());
        }

        let sender = &event.sender;
        self.directory
            .upsert(&event.chat_id, sender.handle.as_deref(), &sender.display_name())
            .await;
        info!("{} registered via inline action", event.chat_id);
        self.reply(
            &event.chat_id,
            &self.content.texts.registered_message,
            TextFormat::Plain,
        )
        .await?;
        Ok(self.content.texts.registered_toast.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing_is_exact() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/contact"), Some(Command::Contact));
        assert_eq!(Command::parse("/Start"), None);
        assert_eq!(Command::parse("/start now"), None);
        assert_eq!(AdminCommand::parse("/users"), Some(AdminCommand::Users));
        assert_eq!(AdminCommand::parse("/users "), None);
    }
}
