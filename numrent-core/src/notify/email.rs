//! E-mail channel.
//!
//! Stateless: every relevant event is a fresh mail. Only final deposit
//! outcomes and high-severity alerts are mailed; everything else is left to
//! the chat channel.

use super::{ChatMessage, NotificationChannel, NotificationEvent};
use crate::config::EmailConfig;
use crate::ledger::LedgerStore;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use numrent_sdk::objects::Severity;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("lookup of recipient failed: {0}")]
    Recipient(String),
}

/// Outgoing mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// SMTP relay with credentials.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<Self, MailError> {
        let from: Mailbox = config.from.parse()?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        Ok(Self { from, transport })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_owned())?;
        self.transport.send(message).await?;
        Ok(())
    }
}

/// [`NotificationChannel`] that mails users (and the operator for alerts).
pub struct EmailChannel {
    mailer: Arc<dyn Mailer>,
    ledger: Arc<dyn LedgerStore>,
    admin_address: Option<String>,
}

impl EmailChannel {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        ledger: Arc<dyn LedgerStore>,
        admin_address: Option<String>,
    ) -> Self {
        Self {
            mailer,
            ledger,
            admin_address,
        }
    }

    fn is_relevant(event: &NotificationEvent) -> bool {
        match event {
            NotificationEvent::Deposit(p) => p.status.is_terminal(),
            NotificationEvent::Alert(p) => p.severity >= Severity::High,
            _ => false,
        }
    }

    async fn recipient(&self, event: &NotificationEvent) -> Result<Option<String>, MailError> {
        match event.user_id() {
            Some(user_id) => self
                .ledger
                .user_email(user_id)
                .await
                .map_err(|e| MailError::Recipient(e.to_string())),
            None => Ok(self.admin_address.clone()),
        }
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<bool, MailError> {
        if !Self::is_relevant(event) {
            return Ok(false);
        }
        let Some(to) = self.recipient(event).await? else {
            debug!(kind = event.kind(), user_id = ?event.user_id(), "No e-mail address on file");
            return Ok(false);
        };

        let message = ChatMessage::from_event(event, time::OffsetDateTime::now_utc());
        self.mailer
            .send_mail(&to, &message.subject(), &message.render_text())
            .await?;

        info!(kind = event.kind(), user_id = ?event.user_id(), "E-mail notification sent");
        Ok(true)
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, event: &NotificationEvent) -> bool {
        match self.deliver(event).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(
                    kind = event.kind(),
                    user_id = ?event.user_id(),
                    error = %e,
                    "E-mail notification failed"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryLedger, RecordingMailer};
    use numrent_sdk::objects::{AlertPayload, DepositPayload, DepositState};
    use rust_decimal_macros::dec;

    fn deposit(status: DepositState) -> NotificationEvent {
        NotificationEvent::Deposit(DepositPayload {
            deposit_id: "d-7".into(),
            user_id: 3,
            amount: dec!(25.00),
            method: "upi".into(),
            status,
            valid_until: 0,
            balance: Some(dec!(25.00)),
        })
    }

    fn alert(severity: Severity) -> NotificationEvent {
        NotificationEvent::Alert(AlertPayload {
            title: "Gateway".into(),
            message: "unreachable".into(),
            severity,
            user_id: None,
        })
    }

    async fn channel(admin: Option<&str>) -> (EmailChannel, Arc<RecordingMailer>) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set_email(3, "user3@example.com").await;
        let mailer = Arc::new(RecordingMailer::new());
        let channel = EmailChannel::new(mailer.clone(), ledger, admin.map(str::to_owned));
        (channel, mailer)
    }

    #[tokio::test]
    async fn test_only_terminal_deposits_are_mailed() {
        let (channel, mailer) = channel(None).await;

        assert!(!channel.send(&deposit(DepositState::Pending)).await);
        assert!(channel.send(&deposit(DepositState::Completed)).await);

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "user3@example.com");
        assert_eq!(sent[0].1, "Wallet Deposit: Successfully Credited");
        assert!(sent[0].2.contains("Amount: 25.00"));
    }

    #[tokio::test]
    async fn test_alerts_below_high_are_skipped() {
        let (channel, mailer) = channel(Some("ops@example.com")).await;

        assert!(!channel.send(&alert(Severity::Warning)).await);
        assert!(channel.send(&alert(Severity::Critical)).await);

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ops@example.com");
    }

    #[tokio::test]
    async fn test_missing_address_is_not_delivered() {
        let (channel, mailer) = channel(None).await;
        assert!(!channel.send(&alert(Severity::High)).await);
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_reports_false() {
        let (channel, mailer) = channel(None).await;
        mailer.fail(true).await;
        assert!(!channel.send(&deposit(DepositState::Failed)).await);
    }
}
