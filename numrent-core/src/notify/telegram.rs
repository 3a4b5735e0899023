//! Telegram Bot API transport for [`ChatApi`].
//!
//! Users map to forum topics inside one supergroup.

use super::chat::{ChatApi, ChatApiError};
use crate::config::TelegramConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ForumTopic {
    message_thread_id: i64,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Map a failed call's description to the error the chat channel reacts to.
fn classify(code: i64, description: String) -> ChatApiError {
    let lower = description.to_lowercase();
    if lower.contains("message is not modified") {
        ChatApiError::NotModified
    } else if lower.contains("message to edit not found") || lower.contains("message not found") {
        ChatApiError::MessageNotFound
    } else if lower.contains("thread not found") || lower.contains("topic_deleted") {
        ChatApiError::ThreadNotFound
    } else {
        ChatApiError::Api { code, description }
    }
}

pub struct TelegramChatApi {
    base: String,
    chat_id: i64,
    http_client: reqwest::Client,
}

impl TelegramChatApi {
    /// Fails only if the HTTP client cannot be built (TLS backend setup).
    pub fn new(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        let root = config
            .api_base
            .as_ref()
            .map(|u| u.as_str().trim_end_matches('/').to_owned())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_owned());
        Ok(Self {
            base: format!("{root}/bot{}", config.bot_token),
            chat_id: config.chat_id,
            http_client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()?,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, ChatApiError> {
        let response = self
            .http_client
            .post(format!("{}/{method}", self.base))
            .json(&body)
            .send()
            .await?;
        let parsed: ApiResponse<T> = response.json().await?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            (_, _) => {
                let code = parsed.error_code.unwrap_or_default();
                let description = parsed
                    .description
                    .unwrap_or_else(|| "missing result".to_owned());
                debug!(method, code, %description, "Bot API call rejected");
                Err(classify(code, description))
            }
        }
    }
}

#[async_trait]
impl ChatApi for TelegramChatApi {
    async fn create_thread(&self, name: &str, icon_color: u32) -> Result<i64, ChatApiError> {
        let topic: ForumTopic = self
            .call(
                "createForumTopic",
                json!({ "chat_id": self.chat_id, "name": name, "icon_color": icon_color }),
            )
            .await?;
        Ok(topic.message_thread_id)
    }

    async fn send_message(&self, thread: Option<i64>, html: &str) -> Result<i64, ChatApiError> {
        let mut body = json!({
            "chat_id": self.chat_id,
            "text": html,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        if let Some(thread) = thread {
            body["message_thread_id"] = json!(thread);
        }
        let sent: SentMessage = self.call("sendMessage", body).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(&self, message_id: i64, html: &str) -> Result<(), ChatApiError> {
        // editMessageText answers with the message object or `true`.
        let _: Value = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": self.chat_id,
                    "message_id": message_id,
                    "text": html,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            )
            .await?;
        Ok(())
    }

    async fn pin_message(&self, message_id: i64) -> Result<(), ChatApiError> {
        let _: bool = self
            .call(
                "pinChatMessage",
                json!({
                    "chat_id": self.chat_id,
                    "message_id": message_id,
                    "disable_notification": true,
                }),
            )
            .await?;
        Ok(())
    }
}
