/// Conversion of Telegram updates into core events
pub mod handlers;
/// Retry wrapper for Telegram API operations
pub mod resilient;
/// `Transport` implementation on top of the Bot API
pub mod transport;

pub use transport::TelegramTransport;
