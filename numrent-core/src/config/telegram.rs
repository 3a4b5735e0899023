//! Chat bot configuration.

use std::time::Duration;

/// Telegram bot credentials and the forum supergroup that hosts one topic
/// per user.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Forum-enabled supergroup id (negative for supergroups).
    pub chat_id: i64,
    /// Override for the Bot API base URL (tests, local Bot API servers).
    pub api_base: Option<url::Url>,
    /// Per-request timeout for Bot API calls.
    pub timeout: Duration,
}
