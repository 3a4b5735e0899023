//! Chat channel with per-user threads and edit-in-place messages.
//!
//! Each user gets one thread inside a shared destination. Messages about an
//! entity with a lifecycle (deposit, order, metrics dashboard) are sent once
//! and then edited, so the thread reads as a live status board instead of a
//! stream of near-duplicates.

use super::{ChatMessage, Delivery, NotificationChannel, NotificationEvent};
use crate::kv::{KeyValueStore, KvError};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Name used in store keys and logs.
const CHANNEL: &str = "chat";

/// Thread icon colours the provisioning API accepts.
pub const THREAD_ICON_COLORS: [u32; 6] = [
    0x6FB9F0, 0xFFD67E, 0xCB86DB, 0x8EEE98, 0xFF93B2, 0xFB6F5F,
];

/// Errors from the chat provisioning API.
#[derive(Debug, Error)]
pub enum ChatApiError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The message to edit no longer exists.
    #[error("message not found")]
    MessageNotFound,

    /// The thread was deleted on the chat side.
    #[error("thread not found")]
    ThreadNotFound,

    /// The edit would not change the message.
    #[error("message is not modified")]
    NotModified,

    /// Any other API-level error
    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },
}

/// Operations against the shared chat destination.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Create a thread and return its handle.
    async fn create_thread(&self, name: &str, icon_color: u32) -> Result<i64, ChatApiError>;

    /// Send an HTML message into `thread` (the destination's main thread when
    /// `None`) and return the message handle.
    async fn send_message(&self, thread: Option<i64>, html: &str) -> Result<i64, ChatApiError>;

    async fn edit_message(&self, message_id: i64, html: &str) -> Result<(), ChatApiError>;

    async fn pin_message(&self, message_id: i64) -> Result<(), ChatApiError>;
}

/// Where a delivered message lives. Stored as `{thread}:{message}`, with an
/// empty thread for the destination's main thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MessageRef {
    thread: Option<i64>,
    message_id: i64,
}

impl MessageRef {
    fn encode(&self) -> String {
        match self.thread {
            Some(thread) => format!("{thread}:{}", self.message_id),
            None => format!(":{}", self.message_id),
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let (thread, message) = raw.split_once(':')?;
        let thread = match thread {
            "" => None,
            t => Some(t.parse().ok()?),
        };
        Some(Self {
            thread,
            message_id: message.parse().ok()?,
        })
    }
}

#[derive(Debug, Error)]
enum ChatError {
    #[error(transparent)]
    Api(#[from] ChatApiError),

    #[error(transparent)]
    Store(#[from] KvError),
}

/// [`NotificationChannel`] delivering into per-user chat threads.
pub struct ChatChannel {
    api: Arc<dyn ChatApi>,
    kv: Arc<dyn KeyValueStore>,
}

impl ChatChannel {
    pub fn new(api: Arc<dyn ChatApi>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { api, kv }
    }

    fn thread_key(user_id: i64) -> String {
        format!("notify:{CHANNEL}:thread:{user_id}")
    }

    fn message_key(entity: &str) -> String {
        format!("notify:{CHANNEL}:msg:{entity}")
    }

    /// Look up the user's thread, creating it on first use.
    ///
    /// Two concurrent creations may both succeed; the later write to the
    /// cache key wins and the other thread is simply left unused.
    async fn resolve_thread(&self, user_id: i64) -> Result<i64, ChatError> {
        let key = Self::thread_key(user_id);
        if let Some(raw) = self.kv.get(&key).await? {
            match raw.parse::<i64>() {
                Ok(thread) => return Ok(thread),
                Err(e) => warn!(user_id, error = %e, "Discarding unreadable thread handle"),
            }
        }

        let color = THREAD_ICON_COLORS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(THREAD_ICON_COLORS[0]);
        let thread = self
            .api
            .create_thread(&format!("User {user_id}"), color)
            .await?;
        self.kv.set(&key, &thread.to_string(), None).await?;

        info!(user_id, thread, "Created conversation thread");
        Ok(thread)
    }

    /// The stored message for `entity`, provided it still lives in the
    /// user's current thread. A ref left behind by a recreated thread counts
    /// as absent.
    async fn stored_message(
        &self,
        entity: &str,
        user_id: Option<i64>,
    ) -> Result<Option<i64>, ChatError> {
        let Some(stored) = self
            .kv
            .get(&Self::message_key(entity))
            .await?
            .and_then(|raw| MessageRef::parse(&raw))
        else {
            return Ok(None);
        };

        let current_thread = match user_id {
            Some(user_id) => match self.kv.get(&Self::thread_key(user_id)).await? {
                Some(raw) => raw.parse::<i64>().ok(),
                None => return Ok(None),
            },
            None => None,
        };
        if stored.thread != current_thread {
            debug!(
                entity,
                stored_thread = ?stored.thread,
                ?current_thread,
                "Stored message is in a replaced thread"
            );
            return Ok(None);
        }
        Ok(Some(stored.message_id))
    }

    /// Send a new message into the user's thread, recreating the thread once
    /// if the chat side reports it gone.
    async fn send_new(&self, user_id: Option<i64>, html: &str) -> Result<MessageRef, ChatError> {
        let Some(user_id) = user_id else {
            let message_id = self.api.send_message(None, html).await?;
            return Ok(MessageRef {
                thread: None,
                message_id,
            });
        };

        let thread = self.resolve_thread(user_id).await?;
        let (thread, message_id) = match self.api.send_message(Some(thread), html).await {
            Ok(id) => (thread, id),
            Err(ChatApiError::ThreadNotFound) => {
                warn!(user_id, thread, "Thread missing on chat side, recreating");
                self.kv.delete(&Self::thread_key(user_id)).await?;
                let thread = self.resolve_thread(user_id).await?;
                (thread, self.api.send_message(Some(thread), html).await?)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(MessageRef {
            thread: Some(thread),
            message_id,
        })
    }

    /// Edit `message_id`. Returns `false` when the message no longer exists.
    async fn try_edit(&self, message_id: i64, html: &str) -> Result<bool, ChatError> {
        match self.api.edit_message(message_id, html).await {
            Ok(()) | Err(ChatApiError::NotModified) => Ok(true),
            Err(ChatApiError::MessageNotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<bool, ChatError> {
        let now = time::OffsetDateTime::now_utc();
        let html = ChatMessage::from_event(event, now).render_html();
        let entity = event.entity_key();

        match (event.delivery(), entity.as_deref()) {
            (Delivery::RefreshOnly, Some(entity)) => match self
                .stored_message(entity, event.user_id())
                .await?
            {
                Some(message_id) => self.try_edit(message_id, &html).await,
                None => {
                    debug!(entity, "No message to refresh");
                    Ok(false)
                }
            },
            (Delivery::Lifecycle, Some(entity)) => {
                if let Some(message_id) = self.stored_message(entity, event.user_id()).await? {
                    if self.try_edit(message_id, &html).await? {
                        debug!(entity, message_id, "Edited message in place");
                        return Ok(true);
                    }
                    debug!(entity, message_id, "Stored message is gone, sending a new one");
                }
                let sent = self.send_new(event.user_id(), &html).await?;
                self.remember(event, entity, sent, now).await?;
                if matches!(event, NotificationEvent::Metrics(_)) {
                    if let Err(e) = self.api.pin_message(sent.message_id).await {
                        debug!(entity, error = %e, "Could not pin message");
                    }
                }
                Ok(true)
            }
            (_, entity) => {
                let sent = self.send_new(event.user_id(), &html).await?;
                if let Some(entity) = entity {
                    self.remember(event, entity, sent, now).await?;
                }
                Ok(true)
            }
        }
    }

    async fn remember(
        &self,
        event: &NotificationEvent,
        entity: &str,
        sent: MessageRef,
        now: time::OffsetDateTime,
    ) -> Result<(), ChatError> {
        self.kv
            .set(
                &Self::message_key(entity),
                &sent.encode(),
                event.message_ref_ttl(now),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for ChatChannel {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(&self, event: &NotificationEvent) -> bool {
        match self.deliver(event).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(
                    kind = event.kind(),
                    user_id = ?event.user_id(),
                    error = %e,
                    "Chat notification failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::testing::{ChatCall, FakeChatApi};
    use numrent_sdk::objects::{
        AlertPayload, DepositPayload, DepositState, OrderState, OrderUpdatePayload, Severity,
        UserMetricsPayload,
    };
    use rust_decimal_macros::dec;

    fn channel() -> (ChatChannel, Arc<FakeChatApi>, Arc<MemoryStore>) {
        let api = Arc::new(FakeChatApi::new());
        let kv = Arc::new(MemoryStore::new());
        (ChatChannel::new(api.clone(), kv.clone()), api, kv)
    }

    fn order(status: OrderState) -> NotificationEvent {
        order_with_id("o-9", status)
    }

    fn order_with_id(order_id: &str, status: OrderState) -> NotificationEvent {
        NotificationEvent::OrderUpdate(OrderUpdatePayload {
            order_id: order_id.into(),
            user_id: 5,
            service: "telegram".into(),
            phone_number: Some("+15550100".into()),
            price: dec!(0.40),
            status,
            sms_code: None,
        })
    }

    #[tokio::test]
    async fn test_lifecycle_messages_are_edited_in_place() {
        let (channel, api, _) = channel();

        assert!(channel.send(&order(OrderState::Pending)).await);
        assert!(channel.send(&order(OrderState::Active)).await);
        assert!(channel.send(&order(OrderState::Completed)).await);

        assert_eq!(api.threads_created().await, 1);
        assert_eq!(api.sent().await.len(), 1);
        let edits = api.edits().await;
        assert_eq!(edits.len(), 2);
        assert!(edits[1].1.contains("Completed"));
    }

    #[tokio::test]
    async fn test_thread_is_reused_across_entities() {
        let (channel, api, kv) = channel();

        channel.send(&order(OrderState::Pending)).await;
        channel.send(&order_with_id("o-10", OrderState::Pending)).await;

        assert_eq!(api.threads_created().await, 1);
        assert_eq!(api.sent().await.len(), 2);
        assert!(kv.get("notify:chat:thread:5").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_edit_of_deleted_message_falls_back_to_send() {
        let (channel, api, _) = channel();

        channel.send(&order(OrderState::Pending)).await;
        api.forget_messages().await;
        assert!(channel.send(&order(OrderState::Active)).await);

        assert_eq!(api.sent().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_thread_is_recreated() {
        let (channel, api, _) = channel();

        channel.send(&order(OrderState::Pending)).await;
        api.forget_threads().await;
        let redeem = NotificationEvent::Redeem(crate::notify::RedeemNotice {
            user_id: 5,
            code: "ABCD".into(),
            amount: dec!(5),
            balance: dec!(5),
        });
        assert!(channel.send(&redeem).await);

        assert_eq!(api.threads_created().await, 2);
    }

    #[tokio::test]
    async fn test_message_ref_records_its_thread() {
        let (channel, api, kv) = channel();

        channel.send(&order(OrderState::Pending)).await;

        let thread = kv.get("notify:chat:thread:5").await.unwrap().unwrap();
        let message_id = api
            .calls()
            .await
            .iter()
            .find_map(|c| match c {
                ChatCall::Send { message_id, .. } => Some(*message_id),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            kv.get("notify:chat:msg:order:o-9").await.unwrap(),
            Some(format!("{thread}:{message_id}"))
        );
    }

    #[tokio::test]
    async fn test_message_in_replaced_thread_is_sent_again() {
        let (channel, api, _) = channel();

        channel.send(&order(OrderState::Pending)).await;
        api.forget_threads().await;
        let redeem = NotificationEvent::Redeem(crate::notify::RedeemNotice {
            user_id: 5,
            code: "ABCD".into(),
            amount: dec!(5),
            balance: dec!(5),
        });
        channel.send(&redeem).await;
        assert!(channel.send(&order(OrderState::Active)).await);

        assert!(api.edits().await.is_empty());
        let sent = api.sent().await;
        assert_eq!(sent.len(), 3);
        assert_ne!(sent[0].0, sent[2].0);
        assert_eq!(sent[1].0, sent[2].0);
    }

    #[test]
    fn test_message_ref_format() {
        let in_thread = MessageRef {
            thread: Some(7),
            message_id: 42,
        };
        assert_eq!(in_thread.encode(), "7:42");
        assert_eq!(MessageRef::parse("7:42"), Some(in_thread));
        assert_eq!(
            MessageRef::parse(":42"),
            Some(MessageRef {
                thread: None,
                message_id: 42
            })
        );
        assert_eq!(MessageRef::parse("42"), None);
    }

    #[tokio::test]
    async fn test_countdown_never_creates_messages() {
        let (channel, api, _) = channel();
        let payload = DepositPayload {
            deposit_id: "d-1".into(),
            user_id: 5,
            amount: dec!(10),
            method: "card".into(),
            status: DepositState::Pending,
            valid_until: time::OffsetDateTime::now_utc().unix_timestamp() + 600,
            balance: None,
        };

        assert!(!channel.send(&NotificationEvent::DepositCountdown(payload.clone())).await);
        assert!(api.calls().await.is_empty());

        channel.send(&NotificationEvent::Deposit(payload.clone())).await;
        assert!(channel.send(&NotificationEvent::DepositCountdown(payload)).await);
        assert_eq!(api.sent().await.len(), 1);
        assert_eq!(api.edits().await.len(), 1);
    }

    #[tokio::test]
    async fn test_one_shot_always_sends() {
        let (channel, api, _) = channel();
        let alert = NotificationEvent::Alert(AlertPayload {
            title: "Gateway down".into(),
            message: "circuit open".into(),
            severity: Severity::Critical,
            user_id: None,
        });

        channel.send(&alert).await;
        channel.send(&alert).await;

        assert_eq!(api.sent().await.len(), 2);
        assert_eq!(api.threads_created().await, 0);
        assert!(
            api.calls()
                .await
                .iter()
                .all(|c| matches!(c, ChatCall::Send { thread: None, .. }))
        );
    }

    #[tokio::test]
    async fn test_metrics_dashboard_is_pinned_once() {
        let (channel, api, _) = channel();
        let metrics = NotificationEvent::Metrics(UserMetricsPayload {
            user_id: 5,
            balance: dec!(10),
            total_deposited: dec!(10),
            total_spent: dec!(0),
            purchases: 0,
        });

        channel.send(&metrics).await;
        channel.send(&metrics).await;

        assert_eq!(api.pins().await, 1);
        assert_eq!(api.edits().await.len(), 1);
    }

    #[tokio::test]
    async fn test_api_failure_reports_false() {
        let (channel, api, _) = channel();
        api.fail_all(true).await;
        assert!(!channel.send(&order(OrderState::Pending)).await);
    }
}
