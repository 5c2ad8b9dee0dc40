//! Fan-out delivery.
//!
//! Broadcasts, relays and scheduled announcements all attempt every
//! recipient in turn, one call at a time, and fold the outcomes into a
//! [`DeliveryReport`]. A failing recipient never stops the loop.

use crate::transport::{TextFormat, Transport, TransportError};
use tracing::debug;

/// What to deliver to each recipient.
#[derive(Debug, Clone, Copy)]
pub enum Outbound<'a> {
    /// A text message.
    Text {
        /// Body
        text: &'a str,
        /// Formatting
        format: TextFormat,
    },
    /// A forward of an existing message.
    Forward {
        /// Chat holding the original message.
        source_chat: &'a str,
        /// Message reference inside `source_chat`.
        message_id: i32,
    },
}

/// A single recipient that could not be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Recipient identifier.
    pub recipient: String,
    /// Why delivery failed.
    pub error: TransportError,
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Recipients that accepted the message.
    pub delivered: usize,
    /// Recipients that failed.
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    /// Fold one outcome into the report.
    #[must_use]
    pub fn record(mut self, recipient: &str, outcome: Result<(), TransportError>) -> Self {
        match outcome {
            Ok(()) => self.delivered += 1,
            Err(error) => {
                debug!("Delivery to {recipient} failed: {error}");
                self.failures.push(DeliveryFailure {
                    recipient: recipient.to_string(),
                    error,
                });
            }
        }
        self
    }

    /// Number of recipients attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    /// Number of failed recipients.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Deliver `payload` to one recipient.
///
/// # Errors
///
/// Returns the transport error for this recipient.
pub async fn deliver_one(
    transport: &dyn Transport,
    recipient: &str,
    payload: Outbound<'_>,
) -> Result<(), TransportError> {
    match payload {
        Outbound::Text { text, format } => transport.send_message(recipient, text, format).await,
        Outbound::Forward {
            source_chat,
            message_id,
        } => {
            transport
                .forward_message(recipient, source_chat, message_id)
                .await
        }
    }
}

/// Deliver `payload` to every recipient sequentially.
pub async fn deliver_all<I, S>(
    transport: &dyn Transport,
    recipients: I,
    payload: Outbound<'_>,
) -> DeliveryReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut report = DeliveryReport::default();
    for recipient in recipients {
        let recipient = recipient.as_ref();
        let outcome = deliver_one(transport, recipient, payload).await;
        report = report.record(recipient, outcome);
    }
    report
}
