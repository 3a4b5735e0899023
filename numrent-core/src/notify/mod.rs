//! Notification delivery.
//!
//! A [`NotificationEvent`] describes something the user should hear about.
//! The [`Notifier`] fans each event out to every enabled
//! [`NotificationChannel`] concurrently; channels decide on their own whether
//! the event is relevant and how to deliver it.
//!
//! - `ChatChannel`: one forum thread per user, edits lifecycle messages in place
//! - `EmailChannel`: stateless, only terminal deposits and serious alerts

pub mod chat;
pub mod email;
pub mod message;
pub mod telegram;

pub use chat::{ChatApi, ChatApiError, ChatChannel};
pub use email::{EmailChannel, MailError, Mailer, SmtpMailer};
pub use message::ChatMessage;
pub use telegram::TelegramChatApi;

use crate::ledger::LedgerStore;
use async_trait::async_trait;
use compact_str::CompactString;
use futures_util::future::join_all;
use numrent_sdk::objects::{
    AlertPayload, DepositPayload, OrderUpdatePayload, Severity, UserMetricsPayload,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Grace period a deposit message handle outlives the deposit deadline.
const DEPOSIT_REF_GRACE: Duration = Duration::from_secs(60 * 60);
/// Lifetime of an order message handle.
const ORDER_REF_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Lifetime of a redeem confirmation handle.
const REDEEM_REF_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A successful code redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemNotice {
    pub user_id: i64,
    pub code: CompactString,
    pub amount: Decimal,
    pub balance: Decimal,
}

/// Something to tell a user (or the operators) about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// A deposit status change.
    Deposit(DepositPayload),
    /// Periodic refresh of a pending deposit's countdown. Never creates a
    /// new message.
    DepositCountdown(DepositPayload),
    OrderUpdate(OrderUpdatePayload),
    Alert(AlertPayload),
    Metrics(UserMetricsPayload),
    Redeem(RedeemNotice),
}

/// How a channel with message identity should treat an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Edit the entity's existing message if there is one, otherwise send.
    Lifecycle,
    /// Always send a new message (still remembering it).
    OneShot,
    /// Edit the existing message; do nothing when there is none.
    RefreshOnly,
}

impl NotificationEvent {
    /// Owning user, `None` for operator-wide alerts.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            NotificationEvent::Deposit(p) | NotificationEvent::DepositCountdown(p) => {
                Some(p.user_id)
            }
            NotificationEvent::OrderUpdate(p) => Some(p.user_id),
            NotificationEvent::Alert(p) => p.user_id,
            NotificationEvent::Metrics(p) => Some(p.user_id),
            NotificationEvent::Redeem(n) => Some(n.user_id),
        }
    }

    /// Key of the entity whose message this event updates, if it has one.
    pub fn entity_key(&self) -> Option<String> {
        match self {
            NotificationEvent::Deposit(p) | NotificationEvent::DepositCountdown(p) => {
                Some(format!("deposit:{}", p.deposit_id))
            }
            NotificationEvent::OrderUpdate(p) => Some(format!("order:{}", p.order_id)),
            NotificationEvent::Alert(_) => None,
            NotificationEvent::Metrics(p) => Some(format!("metrics:{}", p.user_id)),
            NotificationEvent::Redeem(n) => Some(format!("redeem:{}:{}", n.code, n.user_id)),
        }
    }

    pub fn delivery(&self) -> Delivery {
        match self {
            NotificationEvent::Deposit(_)
            | NotificationEvent::OrderUpdate(_)
            | NotificationEvent::Metrics(_) => Delivery::Lifecycle,
            NotificationEvent::DepositCountdown(_) => Delivery::RefreshOnly,
            NotificationEvent::Alert(_) | NotificationEvent::Redeem(_) => Delivery::OneShot,
        }
    }

    /// How long a delivered-message handle for this event stays useful.
    ///
    /// `None` means the handle is kept until overwritten.
    pub fn message_ref_ttl(&self, now: time::OffsetDateTime) -> Option<Duration> {
        match self {
            NotificationEvent::Deposit(p) | NotificationEvent::DepositCountdown(p) => {
                let left = (p.valid_until - now.unix_timestamp()).max(0);
                Some(Duration::from_secs(left.unsigned_abs()) + DEPOSIT_REF_GRACE)
            }
            NotificationEvent::OrderUpdate(_) => Some(ORDER_REF_TTL),
            NotificationEvent::Redeem(_) => Some(REDEEM_REF_TTL),
            NotificationEvent::Metrics(_) | NotificationEvent::Alert(_) => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::Deposit(_) => "deposit",
            NotificationEvent::DepositCountdown(_) => "deposit_countdown",
            NotificationEvent::OrderUpdate(_) => "order_update",
            NotificationEvent::Alert(_) => "alert",
            NotificationEvent::Metrics(_) => "metrics",
            NotificationEvent::Redeem(_) => "redeem",
        }
    }
}

/// A delivery channel.
///
/// `send` never fails: problems are logged by the channel and reported as
/// `false`. Financial operations have already been committed by the time a
/// notification is sent, so callers must not act on the result.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, event: &NotificationEvent) -> bool;
}

/// Per-channel outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub results: Vec<(&'static str, bool)>,
}

impl DispatchReport {
    pub fn delivered(&self, channel: &str) -> bool {
        self.results
            .iter()
            .any(|(name, delivered)| *name == channel && *delivered)
    }

    pub fn delivered_count(&self) -> usize {
        self.results.iter().filter(|(_, d)| *d).count()
    }
}

/// Fan-out façade over every enabled channel.
#[derive(Clone)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
    ledger: Arc<dyn LedgerStore>,
}

impl Notifier {
    /// Create a dispatcher. `ledger` is used for the metrics refresh that
    /// follows money-related events.
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, ledger: Arc<dyn LedgerStore>) -> Self {
        Self { channels, ledger }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send `event` through every channel concurrently and wait for all of
    /// them to settle.
    pub async fn dispatch(&self, event: NotificationEvent) -> DispatchReport {
        let sends = self.channels.iter().map(|channel| {
            let event = &event;
            async move { (channel.name(), channel.send(event).await) }
        });
        let results = join_all(sends).await;

        for (name, delivered) in &results {
            if !delivered {
                debug!(channel = name, kind = event.kind(), "Notification not delivered");
            }
        }

        DispatchReport { results }
    }

    /// Dispatch `event` and, independently, refresh the user's metrics.
    async fn dispatch_with_metrics(&self, event: NotificationEvent, user_id: i64) -> DispatchReport {
        let (report, _) =
            futures_util::future::join(self.dispatch(event), self.user_metrics(user_id)).await;
        report
    }

    /// A deposit changed state.
    pub async fn deposit(&self, payload: DepositPayload) -> DispatchReport {
        if payload.status.is_terminal() {
            let user_id = payload.user_id;
            self.dispatch_with_metrics(NotificationEvent::Deposit(payload), user_id)
                .await
        } else {
            self.dispatch(NotificationEvent::Deposit(payload)).await
        }
    }

    /// Refresh the remaining-time display of a pending deposit.
    pub async fn deposit_countdown(&self, payload: DepositPayload) -> DispatchReport {
        self.dispatch(NotificationEvent::DepositCountdown(payload))
            .await
    }

    /// A rental order changed state.
    pub async fn order_update(&self, payload: OrderUpdatePayload) -> DispatchReport {
        let user_id = payload.user_id;
        self.dispatch_with_metrics(NotificationEvent::OrderUpdate(payload), user_id)
            .await
    }

    /// Operator alert without a user.
    pub async fn alert(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
    ) -> DispatchReport {
        self.dispatch(NotificationEvent::Alert(AlertPayload {
            title: title.into(),
            message: message.into(),
            severity,
            user_id: None,
        }))
        .await
    }

    /// Alert with an explicit payload (possibly addressed to a user).
    pub async fn alert_payload(&self, payload: AlertPayload) -> DispatchReport {
        self.dispatch(NotificationEvent::Alert(payload)).await
    }

    /// Recompute and publish the user's balance/spend dashboard.
    pub async fn user_metrics(&self, user_id: i64) -> DispatchReport {
        match self.ledger.user_metrics(user_id).await {
            Ok(metrics) => self.dispatch(NotificationEvent::Metrics(metrics)).await,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to compute user metrics");
                DispatchReport::default()
            }
        }
    }

    /// A promo code was redeemed.
    pub async fn redeem(&self, notice: RedeemNotice) -> DispatchReport {
        let user_id = notice.user_id;
        self.dispatch_with_metrics(NotificationEvent::Redeem(notice), user_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryLedger, RecordingChannel};
    use numrent_sdk::objects::DepositState;
    use rust_decimal_macros::dec;

    fn deposit(status: DepositState) -> DepositPayload {
        DepositPayload {
            deposit_id: "d-1".into(),
            user_id: 42,
            amount: dec!(25.00),
            method: "upi".into(),
            status,
            valid_until: 0,
            balance: None,
        }
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let ok = Arc::new(RecordingChannel::new("ok", true));
        let broken = Arc::new(RecordingChannel::new("broken", false));
        let notifier = Notifier::new(
            vec![broken.clone(), ok.clone()],
            Arc::new(MemoryLedger::new()),
        );

        let report = notifier.deposit(deposit(DepositState::Pending)).await;

        assert!(report.delivered("ok"));
        assert!(!report.delivered("broken"));
        assert_eq!(ok.events().await.len(), 1);
        assert_eq!(broken.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_deposit_refreshes_metrics() {
        let channel = Arc::new(RecordingChannel::new("rec", true));
        let notifier = Notifier::new(vec![channel.clone()], Arc::new(MemoryLedger::new()));

        notifier.deposit(deposit(DepositState::Completed)).await;

        let kinds: Vec<&str> = channel.events().await.iter().map(|e| e.kind()).collect();
        assert!(kinds.contains(&"deposit"));
        assert!(kinds.contains(&"metrics"));
    }

    #[tokio::test]
    async fn test_pending_deposit_skips_metrics() {
        let channel = Arc::new(RecordingChannel::new("rec", true));
        let notifier = Notifier::new(vec![channel.clone()], Arc::new(MemoryLedger::new()));

        notifier.deposit(deposit(DepositState::Pending)).await;

        assert_eq!(channel.events().await.len(), 1);
    }

    #[test]
    fn test_delivery_modes() {
        assert_eq!(
            NotificationEvent::Deposit(deposit(DepositState::Pending)).delivery(),
            Delivery::Lifecycle
        );
        assert_eq!(
            NotificationEvent::DepositCountdown(deposit(DepositState::Pending)).delivery(),
            Delivery::RefreshOnly
        );
        let alert = NotificationEvent::Alert(AlertPayload {
            title: "t".into(),
            message: "m".into(),
            severity: Severity::High,
            user_id: None,
        });
        assert_eq!(alert.delivery(), Delivery::OneShot);
        assert_eq!(alert.entity_key(), None);
    }
}
